//! A population together with the epidemiological parameters needed to
//! project it under a strategy.

use crate::{
    arrival::{ArrivalSummary, InitialCounts, InitialWeight, initialize},
    discovery::{DiscoveryBaselines, DiscoveryModel},
    engine::{Engine, StepParams},
    error::ConfigError,
    groups::Population,
    isolation::{AllDiscovered, ArrivalIsolation, Isolation, IsolationLedger, IsolationPolicy},
    model::{Compartment, Trajectory},
    strategy::{Period, Strategy},
    units::{GenerationTime, Rate, Span},
    utils::{check_len, check_num, check_prob},
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Protection boost given to part of each meta-group.
///
/// A boosted person's infectivity and outside exposure are scaled by
/// `multiplier`, so the meta-group as a whole is scaled by
/// `rate * multiplier + (1 - rate)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Booster {
    rates: Vec<f64>,
    multiplier: f64,
}

impl Booster {
    pub fn new(rates: Vec<f64>, multiplier: f64) -> Result<Self, ConfigError> {
        for (idx, &rate) in rates.iter().enumerate() {
            check_prob(&format!("booster_rate[{idx}]"), rate)?;
        }
        check_num("booster_multiplier", multiplier, 0.0..)?;
        Ok(Self { rates, multiplier })
    }

    pub fn factors(&self) -> Array1<f64> {
        self.rates
            .iter()
            .map(|&rate| rate * self.multiplier + (1.0 - rate))
            .collect()
    }
}

#[derive(Debug)]
pub struct Scenario {
    population: Population,
    gen_time: GenerationTime,
    infectivity: Vec<Rate>,
    outside_rate: Vec<Rate>,
    max_infectious: Span,
    baselines: DiscoveryBaselines,
    booster: Option<Booster>,
    hospitalization_rates: Array1<f64>,
    initial_weight: InitialWeight,
    isolation_policy: Box<dyn IsolationPolicy>,
    arrival_isolation: ArrivalIsolation,
}

impl Scenario {
    /// `infectivity` holds, per meta-group, the infections caused per unit of
    /// contact per day of being infectious and free. `outside_rate` holds the
    /// infections per meta-group caused by exposure outside the population.
    pub fn new(
        population: Population,
        gen_time: GenerationTime,
        infectivity: Vec<Rate>,
        outside_rate: Vec<Rate>,
        max_infectious: Span,
    ) -> Result<Self, ConfigError> {
        let n_mg = population.n_meta_groups();
        check_len("infections_per_day_per_contact_unit", infectivity.len(), n_mg)?;
        check_len("outside_rate", outside_rate.len(), n_mg)?;
        for (mg, (&inf, &out)) in population
            .meta_group_names()
            .into_iter()
            .zip(infectivity.iter().zip(&outside_rate))
        {
            gen_time
                .check_rate("infections_per_day_per_contact_unit", inf)
                .map_err(|err| err.in_meta_group(mg))?;
            gen_time
                .check_rate("outside_rate", out)
                .map_err(|err| err.in_meta_group(mg))?;
        }
        let max_days = gen_time.check_span("max_infectious", max_infectious)?;
        check_num("max_infectious", max_days, f64::MIN_POSITIVE..)?;

        Ok(Self {
            baselines: DiscoveryBaselines::none(n_mg),
            hospitalization_rates: Array1::zeros(n_mg),
            population,
            gen_time,
            infectivity,
            outside_rate,
            max_infectious,
            booster: None,
            initial_weight: InitialWeight::default(),
            isolation_policy: Box::new(AllDiscovered),
            arrival_isolation: ArrivalIsolation::default(),
        })
    }

    pub fn with_baselines(mut self, baselines: DiscoveryBaselines) -> Result<Self, ConfigError> {
        baselines.validate(&self.population)?;
        self.baselines = baselines;
        Ok(self)
    }

    pub fn with_booster(mut self, booster: Booster) -> Result<Self, ConfigError> {
        check_len("booster_rate", booster.rates.len(), self.population.n_meta_groups())?;
        self.booster = Some(booster);
        Ok(self)
    }

    pub fn with_hospitalization_rates(mut self, rates: Vec<f64>) -> Result<Self, ConfigError> {
        check_len("hospitalization_rates", rates.len(), self.population.n_meta_groups())?;
        for (mg, &rate) in self.population.meta_group_names().into_iter().zip(&rates) {
            check_prob("hospitalization_rate", rate).map_err(|err| err.in_meta_group(mg))?;
        }
        self.hospitalization_rates = Array1::from(rates);
        Ok(self)
    }

    pub fn with_initial_weight(mut self, weight: InitialWeight) -> Self {
        self.initial_weight = weight;
        self
    }

    pub fn with_isolation_policy(mut self, policy: Box<dyn IsolationPolicy>) -> Self {
        self.isolation_policy = policy;
        self
    }

    pub fn with_arrival_isolation(mut self, arrival_isolation: ArrivalIsolation) -> Self {
        self.arrival_isolation = arrival_isolation;
        self
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn gen_time(&self) -> GenerationTime {
        self.gen_time
    }

    fn booster_factors(&self) -> Array1<f64> {
        match &self.booster {
            Some(booster) => booster.factors(),
            None => Array1::ones(self.population.n_meta_groups()),
        }
    }

    /// Per meta-group daily infectivity per contact unit, boost included.
    fn infectivity_per_day(&self) -> Array1<f64> {
        let per_day: Array1<f64> = self
            .infectivity
            .iter()
            .map(|&rate| self.gen_time.per_generation(rate) / self.gen_time.days())
            .collect();
        per_day * self.booster_factors()
    }

    fn outside_per_generation(&self) -> Array1<f64> {
        let per_gen: Array1<f64> = self
            .outside_rate
            .iter()
            .map(|&rate| self.gen_time.per_generation(rate))
            .collect();
        per_gen * self.booster_factors()
    }

    /// Recursion parameters in force during `period`.
    pub fn step_params(
        &self,
        period: &Period,
    ) -> Result<(StepParams, DiscoveryModel), ConfigError> {
        let discovery = DiscoveryModel::new(
            &self.population,
            &period.testing_regime,
            &self.baselines,
            self.gen_time,
        )?;

        let max_days = self.gen_time.span_in_days(self.max_infectious);
        let days = discovery.days_infectious(max_days);
        let per_contact_unit = self.infectivity_per_day() * &days;
        log::debug!(
            "testing regime '{}': days infectious {days}, \
             infections per contact unit {per_contact_unit}",
            period.testing_regime.name()
        );

        let interaction = self.population.interaction_matrix(per_contact_unit.view())?
            * period.transmission_multiplier;
        let outside = self
            .population
            .outside_infection(self.outside_per_generation().view())?;

        let params = StepParams {
            interaction,
            outside,
            infection_discovery: discovery.infection().clone(),
            recovered_discovery: discovery.recovered().clone(),
        };
        Ok((params, discovery))
    }

    /// Project the population under `strategy` for `horizon` generations.
    pub fn simulate(
        &self,
        strategy: &Strategy,
        counts: &InitialCounts,
        horizon: usize,
    ) -> Result<SimOutput, ConfigError> {
        let schedule = strategy.schedule(horizon)?;
        let covered = strategy.total_generations();
        if horizon < covered {
            log::warn!(
                "horizon {horizon} truncates strategy '{}' covering {covered} generations",
                strategy.name()
            );
        }

        let (initial, arrival) = initialize(
            &self.population,
            counts,
            strategy.arrival_regime(),
            &self.baselines,
            self.initial_weight,
        )?;
        let mut engine = Engine::new(&self.population, initial, horizon)?;

        let mut ledger = IsolationLedger::new(self.population.n_groups(), horizon);
        let arrivals = self
            .arrival_isolation
            .schedule(arrival.arrival_discovered_by_group.view(), horizon);

        let mut discovered = engine.state().d.clone();
        for (i_per, (period, n_steps)) in schedule.into_iter().enumerate() {
            let (params, discovery) = self.step_params(period)?;
            log::debug!(
                "period {i_per}: {n_steps} generations, a = {}, r = {}",
                discovery.infection_by_meta_group(),
                discovery.recovered_by_meta_group()
            );
            let survival = period.isolation_regime.survival(self.gen_time);
            if i_per == 0 {
                ledger.advance(arrivals.row(0), &survival)?;
            }

            for _ in 0..n_steps {
                engine.run(&params, 1)?;
                let t = engine.generation();
                let newly = &engine.state().d - &discovered;
                let entrants = self.isolation_policy.entering(newly.view()) + &arrivals.row(t);
                ledger.advance(entrants.view(), &survival)?;
                discovered.assign(&engine.state().d);
            }
        }

        Ok(SimOutput {
            strategy: strategy.name().to_string(),
            trajectory: engine.finish(),
            isolation: ledger.finish(),
            arrival,
            hospitalization_rates: self.hospitalization_rates.clone(),
        })
    }
}

/// Everything produced by one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimOutput {
    pub strategy: String,
    pub trajectory: Trajectory,
    pub isolation: Isolation,
    pub arrival: ArrivalSummary,
    pub hospitalization_rates: Array1<f64>,
}

impl SimOutput {
    pub fn cumulative_infections(
        &self,
        meta_groups: Option<&[&str]>,
    ) -> Result<Array1<f64>, ConfigError> {
        self.trajectory.select(Compartment::I, meta_groups, true)
    }

    pub fn discovered(&self, meta_groups: Option<&[&str]>) -> Result<Array1<f64>, ConfigError> {
        self.trajectory.select(Compartment::D, meta_groups, false)
    }

    pub fn isolated(&self, meta_groups: Option<&[&str]>) -> Result<Array1<f64>, ConfigError> {
        let by_mg = self.trajectory.aggregate_by_meta_group(&self.isolation.by_group);
        self.trajectory.project(&by_mg, meta_groups, false)
    }

    pub fn hospitalizations(
        &self,
        meta_groups: Option<&[&str]>,
        cumulative: bool,
    ) -> Result<Array1<f64>, ConfigError> {
        self.trajectory
            .hospitalizations(self.hospitalization_rates.view(), meta_groups, cumulative)
    }
}
