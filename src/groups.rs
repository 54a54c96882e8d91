//! Heterogeneous population made of meta-groups.
//!
//! A meta-group is a cohort sharing every parameter except the amount of
//! social contact. It is split into groups, one per contact level, and
//! groups are the finest unit the simulation tracks. Within a meta-group
//! the population is well-mixed; across meta-groups mixing follows a
//! relative contact matrix.

use crate::{
    error::ConfigError,
    utils::{check_len, check_mat, check_num, check_vec},
};
use ndarray::{Array1, Array2, ArrayView1};
use std::{collections::HashSet, ops::Range};

/// Cohort of people with similar parameters but varying contact levels.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaGroup {
    name: String,
    population: f64,
    levels: Array1<f64>,
    fractions: Array1<f64>,
}

impl MetaGroup {
    /// Build a meta-group from paired contact levels and population fractions.
    pub fn new(
        name: &str,
        population: f64,
        levels: Vec<f64>,
        fractions: Vec<f64>,
    ) -> Result<Self, ConfigError> {
        let levels = Array1::from(levels);
        let fractions = Array1::from(fractions);

        let validate = || -> Result<(), ConfigError> {
            check_num("population", population, 0.0..)?;
            if levels.is_empty() {
                return Err(ConfigError::Invalid(
                    "contact levels must not be empty".to_string(),
                ));
            }
            check_vec("contact_levels", levels.view(), levels.len(), false)?;
            check_len("fractions", fractions.len(), levels.len())?;
            check_vec("fractions", fractions.view(), levels.len(), true)
        };
        validate().map_err(|err| err.in_meta_group(name))?;

        Ok(Self {
            name: name.to_string(),
            population,
            levels,
            fractions,
        })
    }

    /// Build a meta-group whose contact levels `1..=upper_bound` follow a
    /// Pareto distribution with the given shape, truncated and renormalized.
    pub fn from_truncated_pareto(
        name: &str,
        population: f64,
        shape: f64,
        upper_bound: usize,
    ) -> Result<Self, ConfigError> {
        check_num("pareto_shape", shape, f64::MIN_POSITIVE..)
            .map_err(|err| err.in_meta_group(name))?;
        if upper_bound == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}.pareto_upper_bound must be at least 1"
            )));
        }

        let levels: Vec<f64> = (1..=upper_bound).map(|k| k as f64).collect();
        let pdf: Vec<f64> = levels
            .iter()
            .map(|&k| shape / k.powf(shape + 1.0))
            .collect();
        let total: f64 = pdf.iter().sum();
        let fractions = pdf.iter().map(|p| p / total).collect();

        Self::new(name, population, levels, fractions)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn levels(&self) -> &Array1<f64> {
        &self.levels
    }

    pub fn fractions(&self) -> &Array1<f64> {
        &self.fractions
    }

    /// Number of contact-level groups.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn sizes(&self) -> Array1<f64> {
        &self.fractions * self.population
    }

    /// Share of this meta-group's contact carried by each group.
    ///
    /// All zeros when the meta-group makes no contact at all.
    pub fn contact_shares(&self) -> Array1<f64> {
        let weighted = self.sizes() * &self.levels;
        let total = weighted.sum();
        if total > 0.0 {
            weighted / total
        } else {
            Array1::zeros(self.n_levels())
        }
    }

    /// Share of this meta-group's population in each group.
    pub fn population_shares(&self) -> Array1<f64> {
        if self.population > 0.0 {
            self.fractions.clone()
        } else {
            Array1::zeros(self.n_levels())
        }
    }
}

/// One contact level within one meta-group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Group {
    pub meta_group: usize,
    pub level: f64,
    pub size: f64,
}

/// Ordered collection of meta-groups and the contacts between them.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    meta_groups: Vec<MetaGroup>,
    contact_matrix: Array2<f64>,
    groups: Vec<Group>,
    offsets: Vec<usize>,
}

impl Population {
    /// Entry `[i, j]` of `contact_matrix` is the relative contact intensity
    /// that meta-group `i` directs at meta-group `j`.
    pub fn new(
        meta_groups: Vec<MetaGroup>,
        contact_matrix: Array2<f64>,
    ) -> Result<Self, ConfigError> {
        let n_mg = meta_groups.len();
        if n_mg == 0 {
            return Err(ConfigError::Invalid(
                "population must have at least one meta-group".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for mg in &meta_groups {
            if !names.insert(mg.name()) {
                return Err(ConfigError::DuplicateMetaGroup {
                    name: mg.name().to_string(),
                });
            }
        }

        check_mat("meta_group_contact_matrix", contact_matrix.view(), (n_mg, n_mg))?;

        let mut groups = Vec::new();
        let mut offsets = Vec::with_capacity(n_mg + 1);
        for (i_mg, mg) in meta_groups.iter().enumerate() {
            offsets.push(groups.len());
            let sizes = mg.sizes();
            for (&level, &size) in mg.levels().iter().zip(sizes.iter()) {
                groups.push(Group {
                    meta_group: i_mg,
                    level,
                    size,
                });
            }
        }
        offsets.push(groups.len());

        Ok(Self {
            meta_groups,
            contact_matrix,
            groups,
            offsets,
        })
    }

    pub fn meta_groups(&self) -> &[MetaGroup] {
        &self.meta_groups
    }

    pub fn n_meta_groups(&self) -> usize {
        self.meta_groups.len()
    }

    pub fn meta_group_names(&self) -> Vec<&str> {
        self.meta_groups.iter().map(MetaGroup::name).collect()
    }

    pub fn meta_group_index(&self, name: &str) -> Option<usize> {
        self.meta_groups.iter().position(|mg| mg.name() == name)
    }

    /// Look up a meta-group index, failing with the caller's context.
    pub fn require_meta_group(&self, name: &str, context: &str) -> Result<usize, ConfigError> {
        self.meta_group_index(name)
            .ok_or_else(|| ConfigError::UnknownMetaGroup {
                name: name.to_string(),
                context: context.to_string(),
            })
    }

    pub fn contact_matrix(&self) -> &Array2<f64> {
        &self.contact_matrix
    }

    /// Flattened groups, ordered by meta-group then contact level.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Indices of the groups belonging to meta-group `i_mg`.
    pub fn group_ids(&self, i_mg: usize) -> Range<usize> {
        self.offsets[i_mg]..self.offsets[i_mg + 1]
    }

    pub fn meta_group_of(&self, i_grp: usize) -> usize {
        self.groups[i_grp].meta_group
    }

    pub fn sizes(&self) -> Array1<f64> {
        self.groups.iter().map(|grp| grp.size).collect()
    }

    pub fn total_population(&self) -> f64 {
        self.meta_groups.iter().map(MetaGroup::population).sum()
    }

    /// Broadcast one value per meta-group to every group it owns.
    pub fn to_groups(&self, per_meta_group: ArrayView1<f64>) -> Array1<f64> {
        self.groups
            .iter()
            .map(|grp| per_meta_group[grp.meta_group])
            .collect()
    }

    /// Group-by-group interaction matrix.
    ///
    /// `A[p, q]` is the expected number of infections an infectious person
    /// in group `p` causes in group `q` over one generation. The
    /// `infections_per_contact_unit` entry of the source meta-group is used.
    pub fn interaction_matrix(
        &self,
        infections_per_contact_unit: ArrayView1<f64>,
    ) -> Result<Array2<f64>, ConfigError> {
        check_vec(
            "infections_per_contact_unit",
            infections_per_contact_unit,
            self.n_meta_groups(),
            false,
        )?;

        let shares: Vec<Array1<f64>> = self
            .meta_groups
            .iter()
            .map(MetaGroup::contact_shares)
            .collect();

        let k = self.n_groups();
        let mut mat = Array2::zeros((k, k));
        for (p, src) in self.groups.iter().enumerate() {
            let base = src.level * infections_per_contact_unit[src.meta_group];
            for (q, dst) in self.groups.iter().enumerate() {
                let share = shares[dst.meta_group][q - self.offsets[dst.meta_group]];
                mat[[p, q]] = base * self.contact_matrix[[src.meta_group, dst.meta_group]] * share;
            }
        }

        Ok(mat)
    }

    /// Outside infections per generation for each group, apportioned by
    /// the group's share of its meta-group's population.
    pub fn outside_infection(
        &self,
        outside_rate: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ConfigError> {
        check_vec("outside_rate", outside_rate, self.n_meta_groups(), false)?;

        let mut res = Array1::zeros(self.n_groups());
        for (i_mg, mg) in self.meta_groups.iter().enumerate() {
            let shares = mg.population_shares();
            for (i_lvl, i_grp) in self.group_ids(i_mg).enumerate() {
                res[i_grp] = outside_rate[i_mg] * shares[i_lvl];
            }
        }

        Ok(res)
    }
}
