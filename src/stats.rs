use serde::{Deserialize, Serialize};

/// Running mean and variance (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// One [`Accumulator`] per generation.
#[derive(Debug, Clone)]
pub struct SeriesAccumulator {
    acc_vec: Vec<Accumulator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesReport {
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
}

impl SeriesAccumulator {
    pub fn new(len: usize) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(len, Accumulator::new);
        Self { acc_vec }
    }

    pub fn len(&self) -> usize {
        self.acc_vec.len()
    }

    /// Add one run's series. Returns `false` if its length does not match.
    pub fn add<'a>(&mut self, series: impl ExactSizeIterator<Item = &'a f64>) -> bool {
        if series.len() != self.acc_vec.len() {
            return false;
        }
        for (acc, &val) in self.acc_vec.iter_mut().zip(series) {
            acc.add(val);
        }
        true
    }

    pub fn report(&self) -> SeriesReport {
        let reports: Vec<_> = self.acc_vec.iter().map(Accumulator::report).collect();
        SeriesReport {
            mean: reports.iter().map(|rep| rep.mean).collect(),
            std_dev: reports.iter().map(|rep| rep.std_dev).collect(),
        }
    }
}
