//! Surveillance tests and the discovery fractions they induce.
//!
//! For each meta-group a testing regime gives a test and a cadence. These
//! are turned into two per-group vectors consumed by the recursion:
//!
//! * `a`: probability that a newly infected person is discovered in the
//!   generation they are infected;
//! * `r`: probability that a hidden recovered person is discovered in a
//!   given generation.
//!
//! The same `r` is used whatever the test technology. A hidden recovered
//! person should in reality no longer test positive on an infection test;
//! this is a known limitation and is not special-cased.

use crate::{
    error::ConfigError,
    groups::Population,
    micro::days_infectious,
    units::{GenerationTime, Span},
    utils::{check_len, check_num, check_prob},
};
use ndarray::Array1;

const DAYS_PER_WEEK: f64 = 7.0;

/// A surveillance test.
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    name: String,
    sensitivity: f64,
    compliance: f64,
    delay: Span,
}

impl Test {
    pub fn new(
        name: &str,
        sensitivity: f64,
        compliance: f64,
        delay: Span,
    ) -> Result<Self, ConfigError> {
        let scope = |err: ConfigError| err.in_meta_group(&format!("tests.{name}"));
        check_prob("sensitivity", sensitivity).map_err(scope)?;
        check_prob("compliance", compliance).map_err(scope)?;
        check_num("delay", delay.value, 0.0..).map_err(scope)?;
        Ok(Self {
            name: name.to_string(),
            sensitivity,
            compliance,
            delay,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn compliance(&self) -> f64 {
        self.compliance
    }

    pub fn delay(&self) -> Span {
        self.delay
    }

    /// Probability that an infected person offered this test is found.
    pub fn detection_prob(&self) -> f64 {
        self.sensitivity * self.compliance
    }
}

/// Surveillance applied to one meta-group.
#[derive(Debug, Clone, PartialEq)]
pub struct Surveillance {
    pub test: Test,
    pub tests_per_week: f64,
}

/// Per meta-group assignment of a test and a testing frequency.
///
/// Meta-groups without an assignment get no surveillance testing.
#[derive(Debug, Clone, PartialEq)]
pub struct TestingRegime {
    name: String,
    assignments: Vec<(String, Surveillance)>,
}

impl TestingRegime {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            assignments: Vec::new(),
        }
    }

    pub fn with(
        mut self,
        meta_group: &str,
        test: Test,
        tests_per_week: f64,
    ) -> Result<Self, ConfigError> {
        check_num(
            &format!("testing_regimes.{}.{meta_group}.tests_per_week", self.name),
            tests_per_week,
            0.0..,
        )?;
        if self.assignment(meta_group).is_some() {
            return Err(ConfigError::Invalid(format!(
                "testing regime '{}' assigns meta-group '{meta_group}' twice",
                self.name
            )));
        }
        self.assignments.push((
            meta_group.to_string(),
            Surveillance {
                test,
                tests_per_week,
            },
        ));
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn assignment(&self, meta_group: &str) -> Option<&Surveillance> {
        self.assignments
            .iter()
            .find(|(name, _)| name == meta_group)
            .map(|(_, surv)| surv)
    }

    pub fn meta_groups(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(name, _)| name.as_str())
    }
}

/// Discovery that happens without surveillance testing.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryBaselines {
    /// Fraction of new infections that self-report (e.g. symptomatic testing).
    pub symptomatic_rate: f64,
    /// Per meta-group fraction of hidden recovered found each generation
    /// by testing done outside surveillance.
    pub no_surveillance_test_rate: Vec<f64>,
    /// Per meta-group fraction of previously recovered people whose past
    /// infection is already known.
    pub historical_recovered_discovered: Vec<f64>,
}

impl DiscoveryBaselines {
    pub fn none(n_meta_groups: usize) -> Self {
        Self {
            symptomatic_rate: 0.0,
            no_surveillance_test_rate: vec![0.0; n_meta_groups],
            historical_recovered_discovered: vec![0.0; n_meta_groups],
        }
    }

    pub fn validate(&self, population: &Population) -> Result<(), ConfigError> {
        let n_mg = population.n_meta_groups();
        check_prob("symptomatic_rate", self.symptomatic_rate)?;
        check_len("no_surveillance_test_rate", self.no_surveillance_test_rate.len(), n_mg)?;
        check_len(
            "historical_recovered_discovered",
            self.historical_recovered_discovered.len(),
            n_mg,
        )?;
        for (mg, (&rate, &frac)) in population.meta_group_names().into_iter().zip(
            self.no_surveillance_test_rate
                .iter()
                .zip(&self.historical_recovered_discovered),
        ) {
            check_prob("no_surveillance_test_rate", rate).map_err(|err| err.in_meta_group(mg))?;
            check_prob("historical_recovered_discovered", frac)
                .map_err(|err| err.in_meta_group(mg))?;
        }
        Ok(())
    }
}

/// Per meta-group surveillance quantities resolved from a regime.
#[derive(Debug, Clone, PartialEq)]
struct Cadence {
    days_between_tests: f64,
    delay_days: f64,
    detection_prob: f64,
}

/// Discovery fractions for one testing regime on one population.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryModel {
    cadence: Vec<Cadence>,
    surveillance_prob: Array1<f64>,
    infection_mg: Array1<f64>,
    recovered_mg: Array1<f64>,
    infection: Array1<f64>,
    recovered: Array1<f64>,
}

impl DiscoveryModel {
    pub fn new(
        population: &Population,
        regime: &TestingRegime,
        baselines: &DiscoveryBaselines,
        gen_time: GenerationTime,
    ) -> Result<Self, ConfigError> {
        baselines.validate(population)?;
        for name in regime.meta_groups() {
            population.require_meta_group(name, &format!("testing regime '{}'", regime.name()))?;
        }

        let n_mg = population.n_meta_groups();
        let mut cadence = Vec::with_capacity(n_mg);
        let mut surveillance_prob = Array1::zeros(n_mg);
        for (i_mg, mg) in population.meta_groups().iter().enumerate() {
            let entry = match regime.assignment(mg.name()) {
                Some(surv) if surv.tests_per_week > 0.0 => {
                    // Positive tests arrive as a Poisson stream of rate f s c per week.
                    let per_week = surv.tests_per_week * surv.test.detection_prob();
                    surveillance_prob[i_mg] = 1.0 - (-per_week * gen_time.weeks()).exp();
                    Cadence {
                        days_between_tests: DAYS_PER_WEEK / surv.tests_per_week,
                        delay_days: gen_time.check_span("delay", surv.test.delay())?,
                        detection_prob: surv.test.detection_prob(),
                    }
                }
                _ => Cadence {
                    days_between_tests: f64::INFINITY,
                    delay_days: 0.0,
                    detection_prob: 0.0,
                },
            };
            cadence.push(entry);
        }

        let missed = surveillance_prob.mapv(|p| 1.0 - p);
        let infection_mg = missed.mapv(|m| 1.0 - (1.0 - baselines.symptomatic_rate) * m);
        let recovered_mg: Array1<f64> = missed
            .iter()
            .zip(&baselines.no_surveillance_test_rate)
            .map(|(m, rate)| 1.0 - (1.0 - rate) * m)
            .collect();

        let infection = population.to_groups(infection_mg.view());
        let recovered = population.to_groups(recovered_mg.view());

        Ok(Self {
            cadence,
            surveillance_prob,
            infection_mg,
            recovered_mg,
            infection,
            recovered,
        })
    }

    /// Per-group infection discovery fraction `a`.
    pub fn infection(&self) -> &Array1<f64> {
        &self.infection
    }

    /// Per-group recovered discovery fraction `r`.
    pub fn recovered(&self) -> &Array1<f64> {
        &self.recovered
    }

    pub fn infection_by_meta_group(&self) -> &Array1<f64> {
        &self.infection_mg
    }

    pub fn recovered_by_meta_group(&self) -> &Array1<f64> {
        &self.recovered_mg
    }

    /// Per meta-group probability that surveillance alone finds an infected
    /// person within one generation.
    pub fn surveillance_prob(&self) -> &Array1<f64> {
        &self.surveillance_prob
    }

    /// Expected days each meta-group's infected spend infectious and free.
    pub fn days_infectious(&self, max_infectious_days: f64) -> Array1<f64> {
        self.cadence
            .iter()
            .map(|c| {
                days_infectious(
                    c.days_between_tests,
                    c.delay_days,
                    c.detection_prob,
                    max_infectious_days,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::MetaGroup;
    use ndarray::Array2;

    fn close(x: &Array1<f64>, y: &[f64]) -> bool {
        x.len() == y.len() && x.iter().zip(y).all(|(a, b)| (a - b).abs() < 1e-12)
    }

    fn pcr() -> Test {
        Test::new("pcr", 0.8, 0.9, Span::days(1.5)).unwrap()
    }

    fn antigen() -> Test {
        Test::new("antigen", 0.6, 0.5, Span::days(0.0)).unwrap()
    }

    fn population() -> Population {
        let ug = MetaGroup::new("ug", 100.0, vec![1.0, 2.0], vec![0.5, 0.5]).unwrap();
        let grad = MetaGroup::new("grad", 50.0, vec![1.0], vec![1.0]).unwrap();
        let staff = MetaGroup::new("staff", 30.0, vec![1.0], vec![1.0]).unwrap();
        Population::new(vec![ug, grad, staff], Array2::ones((3, 3))).unwrap()
    }

    #[test]
    fn no_testing_and_no_baseline_discovers_nobody() {
        let pop = population();
        let regime = TestingRegime::new("none").with("ug", pcr(), 0.0).unwrap();
        let gen_time = GenerationTime::from_days(4.0).unwrap();
        let model =
            DiscoveryModel::new(&pop, &regime, &DiscoveryBaselines::none(3), gen_time).unwrap();
        assert!(model.infection().iter().all(|&a| a == 0.0));
        assert!(model.recovered().iter().all(|&r| r == 0.0));
        assert_eq!(model.infection().len(), pop.n_groups());
    }

    #[test]
    fn baselines_apply_without_surveillance() {
        let pop = population();
        let regime = TestingRegime::new("none");
        let baselines = DiscoveryBaselines {
            symptomatic_rate: 0.3,
            no_surveillance_test_rate: vec![0.7, 0.1, 0.0],
            historical_recovered_discovered: vec![0.0; 3],
        };
        let gen_time = GenerationTime::from_days(4.0).unwrap();
        let model = DiscoveryModel::new(&pop, &regime, &baselines, gen_time).unwrap();
        assert!(close(model.infection_by_meta_group(), &[0.3, 0.3, 0.3]));
        assert!(close(model.recovered(), &[0.7, 0.7, 0.1, 0.0]));
        assert_eq!(model.recovered().len(), 4);
    }

    #[test]
    fn discovery_grows_with_testing_frequency() {
        let pop = population();
        let gen_time = GenerationTime::from_days(4.0).unwrap();
        let baselines = DiscoveryBaselines::none(3);
        let once = TestingRegime::new("1x")
            .with("ug", pcr(), 1.0)
            .unwrap()
            .with("grad", antigen(), 1.0)
            .unwrap();
        let twice = TestingRegime::new("2x")
            .with("ug", pcr(), 2.0)
            .unwrap()
            .with("grad", antigen(), 2.0)
            .unwrap();
        let once = DiscoveryModel::new(&pop, &once, &baselines, gen_time).unwrap();
        let twice = DiscoveryModel::new(&pop, &twice, &baselines, gen_time).unwrap();

        let a = once.infection_by_meta_group();
        assert!((a[0] - (1.0 - (-0.72_f64 * 4.0 / 7.0).exp())).abs() < 1e-12);
        assert!(a[1] < a[0]);
        assert_eq!(a[2], 0.0);
        for i_mg in 0..2 {
            assert!(twice.infection_by_meta_group()[i_mg] > a[i_mg]);
            assert!(twice.recovered_by_meta_group()[i_mg] > once.recovered_by_meta_group()[i_mg]);
        }
    }

    #[test]
    fn longer_generations_discover_more() {
        let pop = population();
        let regime = TestingRegime::new("1x").with("ug", pcr(), 1.0).unwrap();
        let baselines = DiscoveryBaselines::none(3);
        let model = |days: f64| {
            let gen_time = GenerationTime::from_days(days).unwrap();
            DiscoveryModel::new(&pop, &regime, &baselines, gen_time).unwrap()
        };
        let short = model(3.0);
        let long = model(6.0);
        assert!(long.surveillance_prob()[0] > short.surveillance_prob()[0]);
    }

    #[test]
    fn days_infectious_shrink_under_testing() {
        let pop = population();
        let regime = TestingRegime::new("2x").with("ug", pcr(), 2.0).unwrap();
        let gen_time = GenerationTime::from_days(4.0).unwrap();
        let model =
            DiscoveryModel::new(&pop, &regime, &DiscoveryBaselines::none(3), gen_time).unwrap();
        let days = model.days_infectious(5.0);
        assert!(days[0] < 5.0);
        assert_eq!(days[1], 5.0);
        assert!((days[0] - days_infectious(3.5, 1.5, 0.72, 5.0)).abs() < 1e-12);
    }

    #[test]
    fn unknown_meta_group_is_rejected() {
        let pop = population();
        let regime = TestingRegime::new("bad").with("faculty", pcr(), 1.0).unwrap();
        let gen_time = GenerationTime::from_days(4.0).unwrap();
        let err = DiscoveryModel::new(&pop, &regime, &DiscoveryBaselines::none(3), gen_time)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownMetaGroup { ref name, .. } if name == "faculty"));
    }

    #[test]
    fn invalid_tests_and_baselines_are_rejected() {
        assert!(Test::new("pcr", 1.2, 0.9, Span::days(1.0)).is_err());
        assert!(Test::new("pcr", 0.8, -0.1, Span::days(1.0)).is_err());
        assert!(TestingRegime::new("x").with("ug", pcr(), -1.0).is_err());

        let pop = population();
        let mut baselines = DiscoveryBaselines::none(3);
        baselines.no_surveillance_test_rate = vec![0.0, 1.5, 0.0];
        let err = baselines.validate(&pop).unwrap_err();
        assert!(err.to_string().starts_with("grad.no_surveillance_test_rate"));
        baselines.no_surveillance_test_rate = vec![0.0; 2];
        assert!(baselines.validate(&pop).is_err());
    }
}
