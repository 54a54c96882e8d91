use crate::{
    arrival::ArrivalTestingRegime,
    discovery::TestingRegime,
    error::ConfigError,
    isolation::IsolationRegime,
    utils::check_num,
};

/// A stretch of generations with fixed testing, isolation and transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub generations: usize,
    pub testing_regime: TestingRegime,
    pub isolation_regime: IsolationRegime,
    /// Scales internal transmission only, outside exposure is unaffected.
    pub transmission_multiplier: f64,
}

/// An ordered sequence of periods plus the testing applied at arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    name: String,
    periods: Vec<Period>,
    arrival_regime: ArrivalTestingRegime,
}

impl Strategy {
    pub fn new(
        name: &str,
        periods: Vec<Period>,
        arrival_regime: ArrivalTestingRegime,
    ) -> Result<Self, ConfigError> {
        if periods.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "strategy '{name}' must have at least one period"
            )));
        }
        for (idx, period) in periods.iter().enumerate() {
            if period.generations == 0 {
                return Err(ConfigError::Invalid(format!(
                    "period {idx} of strategy '{name}' must last at least one generation"
                )));
            }
            check_num(
                &format!("strategies.{name}.periods[{idx}].transmission_multiplier"),
                period.transmission_multiplier,
                0.0..,
            )?;
        }

        Ok(Self {
            name: name.to_string(),
            periods,
            arrival_regime,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn arrival_regime(&self) -> &ArrivalTestingRegime {
        &self.arrival_regime
    }

    pub fn total_generations(&self) -> usize {
        self.periods.iter().map(|period| period.generations).sum()
    }

    /// Periods and the number of generations each runs for, truncated at
    /// `horizon`.
    pub fn schedule(&self, horizon: usize) -> Result<Vec<(&Period, usize)>, ConfigError> {
        let covered = self.total_generations();
        if horizon > covered {
            return Err(ConfigError::HorizonTooLong {
                strategy: self.name.clone(),
                horizon,
                covered,
            });
        }

        let mut remaining = horizon;
        let mut res = Vec::with_capacity(self.periods.len());
        for period in &self.periods {
            if remaining == 0 {
                break;
            }
            let n_steps = period.generations.min(remaining);
            res.push((period, n_steps));
            remaining -= n_steps;
        }
        Ok(res)
    }
}
