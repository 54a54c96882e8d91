//! Isolation occupancy reconstructed from discovery history.
//!
//! People discovered at generation `t'` are still isolated at `t` with the
//! probability that their isolation lasts beyond `t - t'`. Each cohort keeps
//! the duration distribution in force when it entered isolation, so a later
//! change of regime never shortens or extends isolations already underway.

use crate::{
    error::ConfigError,
    units::{GenerationTime, Span},
    utils::{SUM_TOL, check_len, check_num, check_prob},
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Distribution of isolation durations.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationRegime {
    durations: Vec<Span>,
    probabilities: Vec<f64>,
}

impl IsolationRegime {
    pub fn new(durations: Vec<Span>, probabilities: Vec<f64>) -> Result<Self, ConfigError> {
        if durations.is_empty() {
            return Err(ConfigError::Invalid(
                "isolation regime must have at least one duration".to_string(),
            ));
        }
        check_len("isolation probabilities", probabilities.len(), durations.len())?;
        for (idx, (span, &prob)) in durations.iter().zip(&probabilities).enumerate() {
            check_num(&format!("isolation durations[{idx}]"), span.value, f64::MIN_POSITIVE..)?;
            check_prob(&format!("isolation probabilities[{idx}]"), prob)?;
        }
        let sum: f64 = probabilities.iter().sum();
        if (sum - 1.0).abs() > SUM_TOL {
            return Err(ConfigError::NotNormalized {
                param: "isolation probabilities".to_string(),
                sum,
                tol: SUM_TOL,
            });
        }

        Ok(Self {
            durations,
            probabilities,
        })
    }

    /// Everyone isolates for exactly `generations` generations.
    pub fn fixed(generations: f64) -> Result<Self, ConfigError> {
        Self::new(vec![Span::generations(generations)], vec![1.0])
    }

    /// Fraction of a cohort still isolated `i` generations after entry.
    ///
    /// Entry generation counts in full; a duration ending partway through a
    /// generation contributes the covered fraction of it.
    pub fn survival(&self, gen_time: GenerationTime) -> Vec<f64> {
        let lengths: Vec<f64> = self
            .durations
            .iter()
            .map(|&span| gen_time.span_in_generations(span))
            .collect();
        let longest = lengths.iter().copied().fold(0.0, f64::max);
        let n_gens = (longest.ceil() as usize).max(1);

        let mut survival = vec![1.0; n_gens];
        for (i, w) in survival.iter_mut().enumerate().skip(1) {
            *w = lengths
                .iter()
                .zip(&self.probabilities)
                .map(|(&len, &prob)| prob * (len - i as f64).clamp(0.0, 1.0))
                .sum();
        }
        survival
    }
}

/// Maps newly discovered people to people entering isolation.
pub trait IsolationPolicy: std::fmt::Debug {
    fn entering(&self, newly_discovered: ArrayView1<f64>) -> Array1<f64>;
}

/// Every discovered person isolates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllDiscovered;

impl IsolationPolicy for AllDiscovered {
    fn entering(&self, newly_discovered: ArrayView1<f64>) -> Array1<f64> {
        newly_discovered.to_owned()
    }
}

/// A fixed fraction of discovered people isolates.
#[derive(Debug, Clone, Copy)]
pub struct FractionIsolated(f64);

impl FractionIsolated {
    pub fn new(frac: f64) -> Result<Self, ConfigError> {
        check_prob("isolated fraction", frac)?;
        Ok(Self(frac))
    }
}

impl IsolationPolicy for FractionIsolated {
    fn entering(&self, newly_discovered: ArrayView1<f64>) -> Array1<f64> {
        newly_discovered.mapv(|x| x * self.0)
    }
}

/// How people discovered by arrival testing enter isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrivalIsolation {
    /// They are not counted in isolation occupancy.
    Exclude,
    /// They all enter isolation at generation 0.
    #[default]
    AtStart,
    /// Arrivals are spread evenly over the first `generations` generations.
    Spread { generations: usize },
}

impl ArrivalIsolation {
    /// Entrants per generation (rows) and group (columns) coming from arrival.
    pub fn schedule(&self, arrival_discovered: ArrayView1<f64>, horizon: usize) -> Array2<f64> {
        let mut res = Array2::zeros((horizon + 1, arrival_discovered.len()));
        match *self {
            Self::Exclude => {}
            Self::AtStart => res.row_mut(0).assign(&arrival_discovered),
            Self::Spread { generations } => {
                let n_gens = generations.clamp(1, horizon + 1);
                let share = arrival_discovered.mapv(|x| x / n_gens as f64);
                for t in 0..n_gens {
                    res.row_mut(t).assign(&share);
                }
            }
        }
        res
    }
}

#[derive(Debug, Clone)]
struct Cohort {
    entry: usize,
    entrants: Array1<f64>,
    survival: Vec<f64>,
}

/// Open isolation cohorts, indexed by entry generation.
#[derive(Debug, Clone)]
pub struct IsolationLedger {
    cohorts: Vec<Cohort>,
    occupancy: Array2<f64>,
    next: usize,
}

impl IsolationLedger {
    pub fn new(n_groups: usize, horizon: usize) -> Self {
        Self {
            cohorts: Vec::new(),
            occupancy: Array2::zeros((horizon + 1, n_groups)),
            next: 0,
        }
    }

    /// Admit generation `next`'s entrants under `survival`, then record the
    /// occupancy of that generation.
    pub fn advance(
        &mut self,
        entrants: ArrayView1<f64>,
        survival: &[f64],
    ) -> Result<(), ConfigError> {
        let t = self.next;
        if t >= self.occupancy.nrows() {
            return Err(ConfigError::Invalid(format!(
                "isolation ledger is full after {} generations",
                self.occupancy.nrows()
            )));
        }
        check_len("isolation entrants", entrants.len(), self.occupancy.ncols())?;
        if survival.is_empty() {
            return Err(ConfigError::Invalid(
                "isolation survival weights must not be empty".to_string(),
            ));
        }

        if entrants.iter().any(|&x| x > 0.0) {
            self.cohorts.push(Cohort {
                entry: t,
                entrants: entrants.to_owned(),
                survival: survival.to_vec(),
            });
        }

        let mut row = self.occupancy.row_mut(t);
        for cohort in &self.cohorts {
            let weight = cohort.survival[t - cohort.entry];
            row.scaled_add(weight, &cohort.entrants);
        }

        self.cohorts.retain(|cohort| t - cohort.entry + 1 < cohort.survival.len());
        self.next += 1;
        Ok(())
    }

    /// Number of cohorts still isolating after the last recorded generation.
    pub fn open_cohorts(&self) -> usize {
        self.cohorts.len()
    }

    pub fn finish(self) -> Isolation {
        Isolation {
            by_group: self.occupancy,
        }
    }
}

/// Isolation occupancy per generation (rows) and group (columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isolation {
    pub by_group: Array2<f64>,
}

impl Isolation {
    pub fn total(&self) -> Array1<f64> {
        self.by_group.rows().into_iter().map(|row| row.sum()).collect()
    }

    pub fn peak(&self) -> f64 {
        self.total().iter().copied().fold(0.0, f64::max)
    }
}

/// Occupancy for a whole history under one duration distribution.
pub fn occupancy(
    entrants: ArrayView2<f64>,
    survival: &[f64],
) -> Result<Isolation, ConfigError> {
    let horizon = entrants.nrows().saturating_sub(1);
    let mut ledger = IsolationLedger::new(entrants.ncols(), horizon);
    for row in entrants.rows() {
        ledger.advance(row, survival)?;
    }
    Ok(ledger.finish())
}
