//! Configuration errors raised while building the model.
//!
//! Every error names the meta-group and parameter it concerns so that a
//! failing scenario can be fixed without reading the code.

use thiserror::Error;

/// Invalid model input, detected at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{param} must be in the range {range}, but is {value}")]
    OutOfRange {
        param: String,
        range: String,
        value: f64,
    },

    #[error("{param} must have length {expected}, but has length {actual}")]
    LengthMismatch {
        param: String,
        expected: usize,
        actual: usize,
    },

    #[error("{param} must have shape {expected:?}, but has shape {actual:?}")]
    ShapeMismatch {
        param: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("{param} must sum to 1.0 (tolerance: {tol}), but sums to {sum}")]
    NotNormalized { param: String, sum: f64, tol: f64 },

    #[error("unknown meta-group '{name}' referenced by {context}")]
    UnknownMetaGroup { name: String, context: String },

    #[error("meta-group '{name}' is defined more than once")]
    DuplicateMetaGroup { name: String },

    #[error("unknown test '{name}' referenced by {context}")]
    UnknownTest { name: String, context: String },

    #[error("meta-group '{name}' has no {context} assigned")]
    MissingAssignment { name: String, context: String },

    #[error("horizon {horizon} exceeds the {covered} generations covered by strategy '{strategy}'")]
    HorizonTooLong {
        strategy: String,
        horizon: usize,
        covered: usize,
    },

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    /// Prefix the parameter name, or the message, with the meta-group it
    /// belongs to.
    pub fn in_meta_group(self, meta_group: &str) -> Self {
        let scope = |param: String| format!("{meta_group}.{param}");
        match self {
            Self::OutOfRange {
                param,
                range,
                value,
            } => Self::OutOfRange {
                param: scope(param),
                range,
                value,
            },
            Self::LengthMismatch {
                param,
                expected,
                actual,
            } => Self::LengthMismatch {
                param: scope(param),
                expected,
                actual,
            },
            Self::ShapeMismatch {
                param,
                expected,
                actual,
            } => Self::ShapeMismatch {
                param: scope(param),
                expected,
                actual,
            },
            Self::NotNormalized { param, sum, tol } => Self::NotNormalized {
                param: scope(param),
                sum,
                tol,
            },
            Self::Invalid(msg) => Self::Invalid(format!("{meta_group}: {msg}")),
            other => other,
        }
    }
}
