//! Simulation state and trajectories.

use crate::{error::ConfigError, groups::Population, utils::check_len};
use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use serde::{Deserialize, Serialize};

/// One of the five tracked buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compartment {
    /// Susceptible.
    S,
    /// Infected during the current generation.
    I,
    /// Recovered.
    R,
    /// Discovered non-susceptible.
    D,
    /// Hidden non-susceptible.
    H,
}

impl Compartment {
    pub const ALL: [Compartment; 5] = [Self::S, Self::I, Self::R, Self::D, Self::H];
}

/// Per-group counts at a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub s: Array1<f64>,
    pub i: Array1<f64>,
    pub r: Array1<f64>,
    pub d: Array1<f64>,
    pub h: Array1<f64>,
}

impl State {
    pub fn zeros(n_groups: usize) -> Self {
        Self {
            s: Array1::zeros(n_groups),
            i: Array1::zeros(n_groups),
            r: Array1::zeros(n_groups),
            d: Array1::zeros(n_groups),
            h: Array1::zeros(n_groups),
        }
    }

    pub fn n_groups(&self) -> usize {
        self.s.len()
    }

    pub fn get(&self, comp: Compartment) -> &Array1<f64> {
        match comp {
            Compartment::S => &self.s,
            Compartment::I => &self.i,
            Compartment::R => &self.r,
            Compartment::D => &self.d,
            Compartment::H => &self.h,
        }
    }

    /// Check lengths and signs before the state seeds a simulation.
    pub fn validate(&self, n_groups: usize) -> Result<(), ConfigError> {
        for comp in Compartment::ALL {
            let vec = self.get(comp);
            check_len(&format!("initial {comp:?}"), vec.len(), n_groups)?;
            if let Some(i_grp) = vec.iter().position(|&x| !x.is_finite() || x < 0.0) {
                return Err(ConfigError::OutOfRange {
                    param: format!("initial {comp:?}[{i_grp}]"),
                    range: "0.0..".to_string(),
                    value: vec[i_grp],
                });
            }
        }
        Ok(())
    }
}

/// Compartment matrices over generations `0..=horizon` (rows) and groups
/// (columns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    meta_group_names: Vec<String>,
    group_meta_group: Vec<usize>,
    s: Array2<f64>,
    i: Array2<f64>,
    r: Array2<f64>,
    d: Array2<f64>,
    h: Array2<f64>,
}

impl Trajectory {
    pub(crate) fn new(population: &Population, horizon: usize) -> Self {
        let dim = (horizon + 1, population.n_groups());
        Self {
            meta_group_names: population
                .meta_group_names()
                .into_iter()
                .map(String::from)
                .collect(),
            group_meta_group: population.groups().iter().map(|grp| grp.meta_group).collect(),
            s: Array2::zeros(dim),
            i: Array2::zeros(dim),
            r: Array2::zeros(dim),
            d: Array2::zeros(dim),
            h: Array2::zeros(dim),
        }
    }

    pub(crate) fn write_row(&mut self, t: usize, state: &State) {
        self.s.row_mut(t).assign(&state.s);
        self.i.row_mut(t).assign(&state.i);
        self.r.row_mut(t).assign(&state.r);
        self.d.row_mut(t).assign(&state.d);
        self.h.row_mut(t).assign(&state.h);
    }

    /// Last generation index.
    pub fn horizon(&self) -> usize {
        self.s.nrows() - 1
    }

    pub fn n_groups(&self) -> usize {
        self.s.ncols()
    }

    pub fn meta_group_names(&self) -> &[String] {
        &self.meta_group_names
    }

    pub fn get(&self, comp: Compartment) -> &Array2<f64> {
        match comp {
            Compartment::S => &self.s,
            Compartment::I => &self.i,
            Compartment::R => &self.r,
            Compartment::D => &self.d,
            Compartment::H => &self.h,
        }
    }

    pub fn row(&self, t: usize) -> State {
        State {
            s: self.s.row(t).to_owned(),
            i: self.i.row(t).to_owned(),
            r: self.r.row(t).to_owned(),
            d: self.d.row(t).to_owned(),
            h: self.h.row(t).to_owned(),
        }
    }

    /// Per-group count discovered at each generation (`D[0]` at row 0).
    pub fn newly_discovered(&self) -> Array2<f64> {
        let mut res = self.d.clone();
        let increments = &self.d.slice(s![1.., ..]) - &self.d.slice(s![..-1, ..]);
        res.slice_mut(s![1.., ..]).assign(&increments);
        res
    }

    /// Sum a per-group matrix into one column per meta-group.
    pub fn aggregate_by_meta_group(&self, mat: &Array2<f64>) -> Array2<f64> {
        let mut res = Array2::zeros((mat.nrows(), self.meta_group_names.len()));
        for (i_grp, col) in mat.axis_iter(Axis(1)).enumerate() {
            let mut target = res.column_mut(self.group_meta_group[i_grp]);
            target += &col;
        }
        res
    }

    /// Compartment summed per meta-group, one row per generation.
    pub fn by_meta_group(&self, comp: Compartment) -> Array2<f64> {
        self.aggregate_by_meta_group(self.get(comp))
    }

    /// Column mask over meta-groups, all of them when `meta_groups` is `None`.
    fn meta_group_mask(&self, meta_groups: Option<&[&str]>) -> Result<Vec<bool>, ConfigError> {
        let Some(names) = meta_groups else {
            return Ok(vec![true; self.meta_group_names.len()]);
        };
        let mut mask = vec![false; self.meta_group_names.len()];
        for name in names {
            let i_mg = self
                .meta_group_names
                .iter()
                .position(|mg| mg.as_str() == *name)
                .ok_or_else(|| ConfigError::UnknownMetaGroup {
                    name: name.to_string(),
                    context: "trajectory selection".to_string(),
                })?;
            mask[i_mg] = true;
        }
        Ok(mask)
    }

    /// Sum a meta-group level matrix over the selected meta-groups,
    /// optionally as a running total over generations.
    pub fn project(
        &self,
        by_meta_group: &Array2<f64>,
        meta_groups: Option<&[&str]>,
        cumulative: bool,
    ) -> Result<Array1<f64>, ConfigError> {
        let mask = self.meta_group_mask(meta_groups)?;
        let mut res: Array1<f64> = by_meta_group
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(x, _)| x)
                    .sum::<f64>()
            })
            .collect();
        if cumulative {
            res.accumulate_axis_inplace(Axis(0), |&prev, curr| *curr += prev);
        }
        Ok(res)
    }

    /// Compartment totals over the selected meta-groups per generation.
    pub fn select(
        &self,
        comp: Compartment,
        meta_groups: Option<&[&str]>,
        cumulative: bool,
    ) -> Result<Array1<f64>, ConfigError> {
        self.project(&self.by_meta_group(comp), meta_groups, cumulative)
    }

    /// Hospitalizations as a per meta-group rate applied to new infections.
    pub fn hospitalizations(
        &self,
        rates: ArrayView1<f64>,
        meta_groups: Option<&[&str]>,
        cumulative: bool,
    ) -> Result<Array1<f64>, ConfigError> {
        check_len("hospitalization_rates", rates.len(), self.meta_group_names.len())?;
        let infected = self.by_meta_group(Compartment::I) * &rates;
        self.project(&infected, meta_groups, cumulative)
    }
}
