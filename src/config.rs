use crate::{
    arrival::{ArrivalTestingRegime, ArrivalTests, InitialCounts, InitialWeight},
    discovery::{DiscoveryBaselines, Test, TestingRegime},
    error::ConfigError,
    groups::{MetaGroup, Population},
    isolation::{
        AllDiscovered, ArrivalIsolation, FractionIsolated, IsolationPolicy, IsolationRegime,
    },
    scenario::{Booster, Scenario},
    strategy::{Period, Strategy},
    units::{GenerationTime, Rate, Span},
    utils::check_num,
};
use anyhow::{Context, Result, bail};
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::LogNormal;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parameters shared by every meta-group.
    pub scenario: ScenarioConfig,
    /// Meta-groups, in the order used for every per meta-group vector.
    pub meta_groups: Vec<MetaGroupConfig>,
    /// Tests, by name.
    #[serde(default)]
    pub tests: BTreeMap<String, TestConfig>,
    /// Surveillance assignments, by regime name then meta-group.
    #[serde(default)]
    pub testing_regimes: BTreeMap<String, BTreeMap<String, SurveillanceConfig>>,
    /// Isolation duration distributions, by name.
    pub isolation_regimes: BTreeMap<String, IsolationConfig>,
    /// Arrival tests, by regime name then meta-group.
    #[serde(default)]
    pub arrival_regimes: BTreeMap<String, BTreeMap<String, ArrivalConfig>>,
    /// Strategies simulated by every run.
    pub strategies: Vec<StrategyConfig>,
    /// Prior used to draw scenario parameters for each run.
    #[serde(default)]
    pub sampling: SamplingConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Length of one generation in days.
    pub generation_days: f64,
    /// Number of generations simulated after generation 0.
    pub horizon: usize,
    /// Maximum length of the infectious period.
    pub max_infectious: Span,
    /// Fraction of new infections found without surveillance.
    #[serde(default)]
    pub symptomatic_rate: f64,
    #[serde(default)]
    pub initial_weight: InitialWeight,
    #[serde(default)]
    pub arrival_isolation: ArrivalIsolation,
    /// Fraction of discovered people who isolate.
    #[serde(default = "one")]
    pub isolated_fraction: f64,
    /// Infectivity and outside exposure multiplier for boosted people.
    #[serde(default = "one")]
    pub booster_multiplier: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MetaGroupConfig {
    pub name: String,
    pub population: f64,
    /// Explicit contact levels, paired with `fractions`.
    pub levels: Option<Vec<f64>>,
    pub fractions: Option<Vec<f64>>,
    /// Truncated Pareto contact levels, instead of `levels` and `fractions`.
    pub pareto: Option<ParetoConfig>,
    /// Relative contact directed at other meta-groups (missing entries are 0).
    #[serde(default)]
    pub contacts: BTreeMap<String, f64>,
    /// Infections per unit of contact per day spent infectious and free.
    pub infectivity: Rate,
    pub outside_rate: Rate,
    #[serde(default)]
    pub no_surveillance_test_rate: f64,
    #[serde(default)]
    pub historical_recovered_discovered: f64,
    #[serde(default)]
    pub hospitalization_rate: f64,
    #[serde(default)]
    pub booster_rate: f64,
    #[serde(default)]
    pub initial_infected: f64,
    #[serde(default)]
    pub initial_recovered: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ParetoConfig {
    pub shape: f64,
    pub upper_bound: usize,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub sensitivity: f64,
    pub compliance: f64,
    pub delay: Span,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SurveillanceConfig {
    pub test: String,
    pub tests_per_week: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct IsolationConfig {
    pub durations: Vec<Span>,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ArrivalConfig {
    pub pre_departure: Option<String>,
    pub arrival: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    /// Arrival regime name, no arrival testing when absent.
    pub arrival_regime: Option<String>,
    pub periods: Vec<PeriodConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PeriodConfig {
    pub generations: usize,
    /// Testing regime name, no surveillance when absent.
    pub testing_regime: Option<String>,
    pub isolation_regime: String,
    #[serde(default = "one")]
    pub transmission_multiplier: f64,
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Base seed, runs are seeded with `seed + run index`. Drawn from the OS when absent.
    pub seed: Option<u64>,
    /// Standard deviation of the log of the infectivity multiplier.
    #[serde(default)]
    pub infectivity_std_dev: f64,
    /// Standard deviation of the log of the outside rate multiplier.
    #[serde(default)]
    pub outside_rate_std_dev: f64,
}

fn one() -> f64 {
    1.0
}

/// Scenario multipliers drawn from the sampling prior.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Draw {
    pub infectivity_multiplier: f64,
    pub outside_rate_multiplier: f64,
}

impl Draw {
    pub const NOMINAL: Draw = Draw {
        infectivity_multiplier: 1.0,
        outside_rate_multiplier: 1.0,
    };
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scenario.horizon == 0 {
            bail!("horizon must be at least 1");
        }
        if self.strategies.is_empty() {
            bail!("at least one strategy is required");
        }
        check_num("sampling.infectivity_std_dev", self.sampling.infectivity_std_dev, 0.0..)?;
        check_num("sampling.outside_rate_std_dev", self.sampling.outside_rate_std_dev, 0.0..)?;

        self.scenario(Draw::NOMINAL).context("invalid scenario")?;
        self.initial_counts()
            .validate(&self.population()?)
            .context("invalid initial counts")?;
        for strategy in self.strategies().context("invalid strategies")? {
            strategy.schedule(self.scenario.horizon)?;
        }

        Ok(())
    }

    pub fn population(&self) -> Result<Population> {
        let mut meta_groups = Vec::with_capacity(self.meta_groups.len());
        for mg in &self.meta_groups {
            let meta_group = match (&mg.levels, &mg.fractions, &mg.pareto) {
                (Some(levels), Some(fractions), None) => {
                    MetaGroup::new(&mg.name, mg.population, levels.clone(), fractions.clone())?
                }
                (None, None, Some(pareto)) => MetaGroup::from_truncated_pareto(
                    &mg.name,
                    mg.population,
                    pareto.shape,
                    pareto.upper_bound,
                )?,
                _ => bail!(
                    "meta-group '{}' needs either levels and fractions or pareto",
                    mg.name
                ),
            };
            meta_groups.push(meta_group);
        }

        let n_mg = self.meta_groups.len();
        let mut contact_matrix = Array2::zeros((n_mg, n_mg));
        for (i_src, mg) in self.meta_groups.iter().enumerate() {
            for (dst, &val) in &mg.contacts {
                let i_dst = self
                    .meta_groups
                    .iter()
                    .position(|other| &other.name == dst)
                    .ok_or_else(|| ConfigError::UnknownMetaGroup {
                        name: dst.clone(),
                        context: format!("contacts of '{}'", mg.name),
                    })?;
                contact_matrix[[i_src, i_dst]] = val;
            }
        }

        Ok(Population::new(meta_groups, contact_matrix)?)
    }

    pub fn tests(&self) -> Result<BTreeMap<String, Test>> {
        self.tests
            .iter()
            .map(|(name, test)| -> Result<(String, Test)> {
                let test = Test::new(name, test.sensitivity, test.compliance, test.delay)?;
                Ok((name.clone(), test))
            })
            .collect()
    }

    fn testing_regime(&self, name: &str, tests: &BTreeMap<String, Test>) -> Result<TestingRegime> {
        let assignments = self
            .testing_regimes
            .get(name)
            .with_context(|| format!("unknown testing regime '{name}'"))?;
        let mut regime = TestingRegime::new(name);
        for (mg, surv) in assignments {
            let test = lookup_test(tests, &surv.test, &format!("testing regime '{name}'"))?;
            regime = regime.with(mg, test, surv.tests_per_week)?;
        }
        Ok(regime)
    }

    fn arrival_regime(
        &self,
        name: &str,
        tests: &BTreeMap<String, Test>,
    ) -> Result<ArrivalTestingRegime> {
        let assignments = self
            .arrival_regimes
            .get(name)
            .with_context(|| format!("unknown arrival regime '{name}'"))?;
        let context = format!("arrival regime '{name}'");
        let mut regime = ArrivalTestingRegime::new(name);
        for (mg, tests_cfg) in assignments {
            let pre_departure = tests_cfg
                .pre_departure
                .as_deref()
                .map(|test| lookup_test(tests, test, &context))
                .transpose()?;
            let arrival = tests_cfg
                .arrival
                .as_deref()
                .map(|test| lookup_test(tests, test, &context))
                .transpose()?;
            regime = regime.with(
                mg,
                ArrivalTests {
                    pre_departure,
                    arrival,
                },
            )?;
        }
        Ok(regime)
    }

    fn isolation_regime(&self, name: &str) -> Result<IsolationRegime> {
        let iso = self
            .isolation_regimes
            .get(name)
            .with_context(|| format!("unknown isolation regime '{name}'"))?;
        IsolationRegime::new(iso.durations.clone(), iso.probabilities.clone())
            .with_context(|| format!("invalid isolation regime '{name}'"))
    }

    pub fn strategies(&self) -> Result<Vec<Strategy>> {
        let tests = self.tests()?;
        let mut strategies = Vec::with_capacity(self.strategies.len());
        for strat in &self.strategies {
            let mut periods = Vec::with_capacity(strat.periods.len());
            for period in &strat.periods {
                let testing_regime = match &period.testing_regime {
                    Some(name) => self.testing_regime(name, &tests)?,
                    None => TestingRegime::new("none"),
                };
                periods.push(Period {
                    generations: period.generations,
                    testing_regime,
                    isolation_regime: self.isolation_regime(&period.isolation_regime)?,
                    transmission_multiplier: period.transmission_multiplier,
                });
            }
            let arrival_regime = match &strat.arrival_regime {
                Some(name) => self.arrival_regime(name, &tests)?,
                None => ArrivalTestingRegime::new("none"),
            };
            let strategy = Strategy::new(&strat.name, periods, arrival_regime)
                .with_context(|| format!("invalid strategy '{}'", strat.name))?;
            strategies.push(strategy);
        }
        Ok(strategies)
    }

    /// Build the scenario with infectivity and outside rates scaled by `draw`.
    pub fn scenario(&self, draw: Draw) -> Result<Scenario> {
        let gen_time = GenerationTime::from_days(self.scenario.generation_days)?;
        let infectivity = self
            .meta_groups
            .iter()
            .map(|mg| mg.infectivity.scaled(draw.infectivity_multiplier))
            .collect();
        let outside_rate = self
            .meta_groups
            .iter()
            .map(|mg| mg.outside_rate.scaled(draw.outside_rate_multiplier))
            .collect();

        let baselines = DiscoveryBaselines {
            symptomatic_rate: self.scenario.symptomatic_rate,
            no_surveillance_test_rate: self.per_meta_group(|mg| mg.no_surveillance_test_rate),
            historical_recovered_discovered: self
                .per_meta_group(|mg| mg.historical_recovered_discovered),
        };
        let booster = Booster::new(
            self.per_meta_group(|mg| mg.booster_rate),
            self.scenario.booster_multiplier,
        )?;
        let policy: Box<dyn IsolationPolicy> = if self.scenario.isolated_fraction == 1.0 {
            Box::new(AllDiscovered)
        } else {
            Box::new(FractionIsolated::new(self.scenario.isolated_fraction)?)
        };

        let scenario = Scenario::new(
            self.population()?,
            gen_time,
            infectivity,
            outside_rate,
            self.scenario.max_infectious,
        )?
        .with_baselines(baselines)?
        .with_booster(booster)?
        .with_hospitalization_rates(self.per_meta_group(|mg| mg.hospitalization_rate))?
        .with_initial_weight(self.scenario.initial_weight)
        .with_isolation_policy(policy)
        .with_arrival_isolation(self.scenario.arrival_isolation);

        Ok(scenario)
    }

    pub fn initial_counts(&self) -> InitialCounts {
        InitialCounts {
            infected: self.per_meta_group(|mg| mg.initial_infected),
            recovered: self.per_meta_group(|mg| mg.initial_recovered),
        }
    }

    /// Draw scenario multipliers from the log-normal sampling prior.
    pub fn draw<R: Rng>(&self, rng: &mut R) -> Result<Draw> {
        Ok(Draw {
            infectivity_multiplier: sample_multiplier(self.sampling.infectivity_std_dev, rng)?,
            outside_rate_multiplier: sample_multiplier(self.sampling.outside_rate_std_dev, rng)?,
        })
    }

    fn per_meta_group(&self, field: impl Fn(&MetaGroupConfig) -> f64) -> Vec<f64> {
        self.meta_groups.iter().map(field).collect()
    }
}

fn lookup_test(tests: &BTreeMap<String, Test>, name: &str, context: &str) -> Result<Test> {
    let test = tests.get(name).cloned().ok_or_else(|| ConfigError::UnknownTest {
        name: name.to_string(),
        context: context.to_string(),
    })?;
    Ok(test)
}

fn sample_multiplier<R: Rng>(std_dev: f64, rng: &mut R) -> Result<f64> {
    if std_dev == 0.0 {
        return Ok(1.0);
    }
    let dist = LogNormal::new(0.0, std_dev)?;
    Ok(dist.sample(rng))
}
