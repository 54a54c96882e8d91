use crate::error::ConfigError;
use ndarray::{ArrayView1, ArrayView2};
use std::{fmt::Debug, ops::RangeBounds};

/// Tolerance used for every "must sum to 1" check.
pub const SUM_TOL: f64 = 1e-6;

pub fn check_num<R>(param: &str, num: f64, range: R) -> Result<(), ConfigError>
where
    R: RangeBounds<f64> + Debug,
{
    if !num.is_finite() || !range.contains(&num) {
        return Err(ConfigError::OutOfRange {
            param: param.to_string(),
            range: format!("{range:?}"),
            value: num,
        });
    }

    Ok(())
}

pub fn check_prob(param: &str, num: f64) -> Result<(), ConfigError> {
    check_num(param, num, 0.0..=1.0)
}

pub fn check_len(param: &str, len: usize, exp_len: usize) -> Result<(), ConfigError> {
    if len != exp_len {
        return Err(ConfigError::LengthMismatch {
            param: param.to_string(),
            expected: exp_len,
            actual: len,
        });
    }

    Ok(())
}

pub fn check_vec(
    param: &str,
    vec: ArrayView1<f64>,
    exp_len: usize,
    prob_vec: bool,
) -> Result<(), ConfigError> {
    check_len(param, vec.len(), exp_len)?;

    for (idx, &ele) in vec.iter().enumerate() {
        check_num(&format!("{param}[{idx}]"), ele, 0.0..)?;
    }

    if !prob_vec {
        return Ok(());
    }
    let sum = vec.sum();
    if (sum - 1.0).abs() > SUM_TOL {
        return Err(ConfigError::NotNormalized {
            param: param.to_string(),
            sum,
            tol: SUM_TOL,
        });
    }

    Ok(())
}

pub fn check_mat(
    param: &str,
    mat: ArrayView2<f64>,
    exp_dim: (usize, usize),
) -> Result<(), ConfigError> {
    let dim = mat.dim();
    if dim != exp_dim {
        return Err(ConfigError::ShapeMismatch {
            param: param.to_string(),
            expected: exp_dim,
            actual: dim,
        });
    }

    for ((i_row, i_col), &ele) in mat.indexed_iter() {
        check_num(&format!("{param}[{i_row}][{i_col}]"), ele, 0.0..)?;
    }

    Ok(())
}
