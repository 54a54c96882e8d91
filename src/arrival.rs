//! Generation-0 state built from arrival counts and arrival testing.
//!
//! Infected arrivals face a pre-departure test and then a test on arrival.
//! Anyone caught is moved straight to recovered and discovered, since they
//! isolate before they can transmit. Recovered arrivals are partly known
//! from history, and the hidden rest face the same two tests.

use crate::{
    discovery::{DiscoveryBaselines, Test},
    error::ConfigError,
    groups::{MetaGroup, Population},
    model::State,
    utils::{check_len, check_num},
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Tests applied to one meta-group's arrivals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrivalTests {
    pub pre_departure: Option<Test>,
    pub arrival: Option<Test>,
}

impl ArrivalTests {
    pub fn pre_departure_prob(&self) -> f64 {
        self.pre_departure.as_ref().map_or(0.0, Test::detection_prob)
    }

    /// Probability of being missed before departure and caught on arrival.
    pub fn arrival_prob(&self) -> f64 {
        let arrival = self.arrival.as_ref().map_or(0.0, Test::detection_prob);
        (1.0 - self.pre_departure_prob()) * arrival
    }

    pub fn caught_prob(&self) -> f64 {
        self.pre_departure_prob() + self.arrival_prob()
    }
}

/// Per meta-group arrival tests. Meta-groups without an entry are not tested.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalTestingRegime {
    name: String,
    assignments: Vec<(String, ArrivalTests)>,
}

impl ArrivalTestingRegime {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            assignments: Vec::new(),
        }
    }

    pub fn with(mut self, meta_group: &str, tests: ArrivalTests) -> Result<Self, ConfigError> {
        if self.assignment(meta_group).is_some() {
            return Err(ConfigError::Invalid(format!(
                "arrival regime '{}' assigns meta-group '{meta_group}' twice",
                self.name
            )));
        }
        self.assignments.push((meta_group.to_string(), tests));
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assignment(&self, meta_group: &str) -> Option<&ArrivalTests> {
        self.assignments
            .iter()
            .find(|(name, _)| name == meta_group)
            .map(|(_, tests)| tests)
    }

    pub fn meta_groups(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(name, _)| name.as_str())
    }

    /// Pre-departure and arrival detection probabilities per meta-group.
    pub fn probabilities(
        &self,
        population: &Population,
    ) -> Result<(Array1<f64>, Array1<f64>), ConfigError> {
        for name in self.meta_groups() {
            population.require_meta_group(name, &format!("arrival regime '{}'", self.name))?;
        }

        let n_mg = population.n_meta_groups();
        let mut pre_departure = Array1::zeros(n_mg);
        let mut arrival = Array1::zeros(n_mg);
        for (i_mg, mg) in population.meta_groups().iter().enumerate() {
            if let Some(tests) = self.assignment(mg.name()) {
                pre_departure[i_mg] = tests.pre_departure_prob();
                arrival[i_mg] = tests.arrival_prob();
            }
        }
        Ok((pre_departure, arrival))
    }
}

/// Infected and recovered arrivals per meta-group, in population order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCounts {
    pub infected: Vec<f64>,
    pub recovered: Vec<f64>,
}

impl InitialCounts {
    pub fn validate(&self, population: &Population) -> Result<(), ConfigError> {
        let n_mg = population.n_meta_groups();
        check_len("initial infected", self.infected.len(), n_mg)?;
        check_len("initial recovered", self.recovered.len(), n_mg)?;
        for (mg, (&inf, &rec)) in population
            .meta_groups()
            .iter()
            .zip(self.infected.iter().zip(&self.recovered))
        {
            let scope = |err: ConfigError| err.in_meta_group(mg.name());
            check_num("initial infected", inf, 0.0..).map_err(scope)?;
            check_num("initial recovered", rec, 0.0..).map_err(scope)?;
            check_num("initial infected + recovered", inf + rec, 0.0..=mg.population())
                .map_err(scope)?;
        }
        Ok(())
    }
}

/// How a meta-group's arrival counts are spread over its contact levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialWeight {
    /// Proportional to group population.
    #[default]
    Population,
    /// Proportional to group population times contact level.
    PopulationTimesContacts,
    /// Everything in the group with the highest contact level.
    MostSocial,
}

impl InitialWeight {
    pub fn shares(&self, mg: &MetaGroup) -> Array1<f64> {
        match self {
            Self::Population => mg.population_shares(),
            Self::PopulationTimesContacts => {
                let shares = mg.contact_shares();
                if shares.sum() > 0.0 {
                    shares
                } else {
                    mg.population_shares()
                }
            }
            Self::MostSocial => {
                let mut shares = Array1::zeros(mg.n_levels());
                let top = mg
                    .levels()
                    .iter()
                    .enumerate()
                    .fold(0, |best, (idx, &lvl)| if lvl >= mg.levels()[best] { idx } else { best });
                shares[top] = 1.0;
                shares
            }
        }
    }
}

/// Arrival discoveries per meta-group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalSummary {
    pub pre_departure_prob: Array1<f64>,
    pub arrival_prob: Array1<f64>,
    /// Caught by the pre-departure test. They isolate before travelling.
    pub pre_departure_discovered: Array1<f64>,
    /// Caught by the arrival test. They isolate on arrival.
    pub arrival_discovered: Array1<f64>,
    /// `arrival_discovered` spread over groups.
    pub arrival_discovered_by_group: Array1<f64>,
}

/// Build the generation-0 state from arrival counts.
pub fn initialize(
    population: &Population,
    counts: &InitialCounts,
    regime: &ArrivalTestingRegime,
    baselines: &DiscoveryBaselines,
    weight: InitialWeight,
) -> Result<(State, ArrivalSummary), ConfigError> {
    counts.validate(population)?;
    baselines.validate(population)?;
    let (pre_prob, arr_prob) = regime.probabilities(population)?;

    let n_mg = population.n_meta_groups();
    let mut state = State::zeros(population.n_groups());
    let mut pre_discovered = Array1::zeros(n_mg);
    let mut arr_discovered = Array1::zeros(n_mg);
    let mut arr_by_group = Array1::zeros(population.n_groups());

    for (i_mg, mg) in population.meta_groups().iter().enumerate() {
        let infected = counts.infected[i_mg];
        let recovered = counts.recovered[i_mg];
        let caught = pre_prob[i_mg] + arr_prob[i_mg];

        let known = baselines.historical_recovered_discovered[i_mg] * recovered;
        let hidden = recovered - known;

        pre_discovered[i_mg] = pre_prob[i_mg] * (infected + hidden);
        arr_discovered[i_mg] = arr_prob[i_mg] * (infected + hidden);

        let free_infected = (1.0 - caught) * infected;
        let init_i = free_infected;
        let init_r = recovered + caught * infected;
        let init_d = caught * infected + known + caught * hidden;
        let init_h = free_infected + (1.0 - caught) * hidden;

        let shares = weight.shares(mg);
        for (i_lvl, i_grp) in population.group_ids(i_mg).enumerate() {
            let w = shares[i_lvl];
            let size = population.groups()[i_grp].size;
            state.i[i_grp] = w * init_i;
            state.r[i_grp] = w * init_r;
            state.d[i_grp] = w * init_d;
            state.h[i_grp] = w * init_h;
            check_num(
                &format!("{}.initial infected + recovered in level {i_lvl}", mg.name()),
                state.i[i_grp] + state.r[i_grp],
                0.0..=size * (1.0 + f64::EPSILON),
            )?;
            state.s[i_grp] = (size - state.i[i_grp] - state.r[i_grp]).max(0.0);
            arr_by_group[i_grp] = w * arr_discovered[i_mg];
        }
    }

    log::debug!("arrival pre-departure discovered: {pre_discovered}");
    log::debug!("arrival discovered: {arr_discovered}");

    let summary = ArrivalSummary {
        pre_departure_prob: pre_prob,
        arrival_prob: arr_prob,
        pre_departure_discovered: pre_discovered,
        arrival_discovered: arr_discovered,
        arrival_discovered_by_group: arr_by_group,
    };
    Ok((state, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Span;
    use ndarray::{Array2, array};

    fn pcr() -> Test {
        Test::new("pcr", 0.8, 0.9, Span::days(1.5)).unwrap()
    }

    fn antigen() -> Test {
        Test::new("antigen", 0.6, 0.5, Span::days(0.0)).unwrap()
    }

    fn tests(pre: Test, arr: Test) -> ArrivalTests {
        ArrivalTests {
            pre_departure: Some(pre),
            arrival: Some(arr),
        }
    }

    fn close(x: &Array1<f64>, y: &[f64]) -> bool {
        x.len() == y.len() && x.iter().zip(y).all(|(a, b)| (a - b).abs() < 1e-9)
    }

    fn three_meta_groups() -> Population {
        let mgs = ["ug", "grad", "staff"]
            .into_iter()
            .map(|name| MetaGroup::new(name, 100.0, vec![1.0], vec![1.0]).unwrap())
            .collect();
        Population::new(mgs, Array2::ones((3, 3))).unwrap()
    }

    fn three_regime() -> ArrivalTestingRegime {
        ArrivalTestingRegime::new("arrival")
            .with("ug", tests(antigen(), pcr()))
            .unwrap()
            .with("grad", tests(pcr(), pcr()))
            .unwrap()
            .with("staff", tests(antigen(), antigen()))
            .unwrap()
    }

    #[test]
    fn single_meta_group_probabilities() {
        let tests = tests(antigen(), pcr());
        assert!((tests.pre_departure_prob() - 0.3).abs() < 1e-12);
        assert!((tests.arrival_prob() - 0.504).abs() < 1e-12);
        assert_eq!(ArrivalTests::default().caught_prob(), 0.0);
    }

    #[test]
    fn three_meta_group_probabilities() {
        let (pre, arr) = three_regime().probabilities(&three_meta_groups()).unwrap();
        assert!(close(&pre, &[0.3, 0.72, 0.3]));
        assert!(close(&arr, &[0.504, 0.2016, 0.21]));
    }

    #[test]
    fn caught_infections_move_to_recovered() {
        let pop = three_meta_groups();
        let counts = InitialCounts {
            infected: vec![1.0, 3.0, 2.0],
            recovered: vec![5.0, 10.0, 6.0],
        };
        let (state, summary) = initialize(
            &pop,
            &counts,
            &three_regime(),
            &DiscoveryBaselines::none(3),
            InitialWeight::Population,
        )
        .unwrap();

        let caught = [0.804, 0.9216, 0.51];
        let exp_i: Vec<f64> = (0..3).map(|m| counts.infected[m] * (1.0 - caught[m])).collect();
        let exp_r: Vec<f64> = (0..3)
            .map(|m| counts.recovered[m] + counts.infected[m] * caught[m])
            .collect();
        assert!(close(&state.i, &exp_i));
        assert!(close(&state.r, &exp_r));

        let exp_arr: Vec<f64> = [0.504, 0.2016, 0.21]
            .iter()
            .zip(counts.infected.iter().zip(&counts.recovered))
            .map(|(p, (i, r))| p * (i + r))
            .collect();
        assert!(close(&summary.arrival_discovered, &exp_arr));
    }

    #[test]
    fn initial_state_is_consistent() {
        let pop = three_meta_groups();
        let counts = InitialCounts {
            infected: vec![1.0, 3.0, 2.0],
            recovered: vec![5.0, 10.0, 6.0],
        };
        let baselines = DiscoveryBaselines {
            symptomatic_rate: 0.0,
            no_surveillance_test_rate: vec![0.0; 3],
            historical_recovered_discovered: vec![0.5, 0.0, 1.0],
        };
        let (state, _) =
            initialize(&pop, &counts, &three_regime(), &baselines, InitialWeight::Population)
                .unwrap();
        let sizes = pop.sizes();
        for g in 0..3 {
            assert!((state.s[g] + state.i[g] + state.r[g] - sizes[g]).abs() < 1e-9);
            assert!((state.d[g] + state.h[g] - state.i[g] - state.r[g]).abs() < 1e-9);
        }
        // Staff recovered are all known; only missed infections stay hidden.
        assert!((state.h[2] - 2.0 * 0.49).abs() < 1e-9);
    }

    #[test]
    fn history_alone_discovers_recovered() {
        let mg = MetaGroup::new("ug", 100.0, vec![1.0], vec![1.0]).unwrap();
        let pop = Population::new(vec![mg], array![[1.0]]).unwrap();
        let counts = InitialCounts {
            infected: vec![0.0],
            recovered: vec![20.0],
        };
        let baselines = DiscoveryBaselines {
            symptomatic_rate: 0.0,
            no_surveillance_test_rate: vec![0.0],
            historical_recovered_discovered: vec![0.25],
        };
        let regime = ArrivalTestingRegime::new("none");
        let (state, summary) =
            initialize(&pop, &counts, &regime, &baselines, InitialWeight::Population).unwrap();
        assert_eq!(state.d, array![5.0]);
        assert_eq!(state.h, array![15.0]);
        assert_eq!(summary.arrival_discovered, array![0.0]);
    }

    #[test]
    fn weights_spread_counts_over_levels() {
        let mg = MetaGroup::new("ug", 100.0, vec![1.0, 3.0], vec![0.5, 0.5]).unwrap();
        let pop = Population::new(vec![mg], array![[1.0]]).unwrap();
        let counts = InitialCounts {
            infected: vec![8.0],
            recovered: vec![0.0],
        };
        let regime = ArrivalTestingRegime::new("none");
        let baselines = DiscoveryBaselines::none(1);
        let run = |weight| initialize(&pop, &counts, &regime, &baselines, weight).unwrap().0;

        assert_eq!(run(InitialWeight::Population).i, array![4.0, 4.0]);
        assert_eq!(run(InitialWeight::PopulationTimesContacts).i, array![2.0, 6.0]);
        assert_eq!(run(InitialWeight::MostSocial).i, array![0.0, 8.0]);
    }

    #[test]
    fn invalid_counts_are_rejected() {
        let pop = three_meta_groups();
        let regime = ArrivalTestingRegime::new("none");
        let baselines = DiscoveryBaselines::none(3);
        let too_many = InitialCounts {
            infected: vec![60.0, 0.0, 0.0],
            recovered: vec![50.0, 0.0, 0.0],
        };
        let err = initialize(&pop, &too_many, &regime, &baselines, InitialWeight::Population)
            .unwrap_err();
        assert!(err.to_string().starts_with("ug."));

        let negative = InitialCounts {
            infected: vec![0.0, -1.0, 0.0],
            recovered: vec![0.0; 3],
        };
        assert!(
            initialize(&pop, &negative, &regime, &baselines, InitialWeight::Population).is_err()
        );

        let unknown = ArrivalTestingRegime::new("bad")
            .with("faculty", ArrivalTests::default())
            .unwrap();
        let counts = InitialCounts {
            infected: vec![0.0; 3],
            recovered: vec![0.0; 3],
        };
        assert!(
            initialize(&pop, &counts, &unknown, &baselines, InitialWeight::Population).is_err()
        );
    }

    #[test]
    fn most_social_overflow_is_rejected() {
        let mg = MetaGroup::new("ug", 100.0, vec![1.0, 3.0], vec![0.9, 0.1]).unwrap();
        let pop = Population::new(vec![mg], array![[1.0]]).unwrap();
        let counts = InitialCounts {
            infected: vec![20.0],
            recovered: vec![0.0],
        };
        let regime = ArrivalTestingRegime::new("none");
        let baselines = DiscoveryBaselines::none(1);
        assert!(initialize(&pop, &counts, &regime, &baselines, InitialWeight::MostSocial).is_err());
    }
}
