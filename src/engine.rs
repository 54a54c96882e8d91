use crate::{
    error::ConfigError,
    groups::Population,
    model::{State, Trajectory},
    utils::{check_mat, check_num, check_vec},
};
use ndarray::{Array1, Array2, Zip};

/// Group-level parameters in force over a stretch of generations.
#[derive(Debug, Clone, PartialEq)]
pub struct StepParams {
    /// `interaction[p, q]`: new infections in group `q` per infectious person in `p`.
    pub interaction: Array2<f64>,
    /// New infections from outside the population, per generation.
    pub outside: Array1<f64>,
    /// Fraction `a` of new infections discovered in the generation they occur.
    pub infection_discovery: Array1<f64>,
    /// Fraction `r` of hidden recovered discovered in each generation.
    pub recovered_discovery: Array1<f64>,
}

impl StepParams {
    pub fn validate(&self, n_groups: usize) -> Result<(), ConfigError> {
        check_mat("interaction", self.interaction.view(), (n_groups, n_groups))?;
        check_vec("outside", self.outside.view(), n_groups, false)?;
        for (name, vec) in [
            ("infection_discovery", &self.infection_discovery),
            ("recovered_discovery", &self.recovered_discovery),
        ] {
            check_vec(name, vec.view(), n_groups, false)?;
            for (i_grp, &val) in vec.iter().enumerate() {
                check_num(&format!("{name}[{i_grp}]"), val, 0.0..=1.0)?;
            }
        }
        Ok(())
    }
}

/// Advance the compartments by one generation.
///
/// New infections come from internal spread and outside exposure, each
/// scaled by the susceptible fraction of the receiving group. The count is
/// then capped at the number of susceptibles; the cap is a saturation of
/// the aggregate count, not a renormalization of the per-source terms. A
/// group with nobody left (`S + I + R = 0`) receives no infections.
pub fn step(state: &State, params: &StepParams) -> State {
    let pressure = state.i.dot(&params.interaction) + &params.outside;

    let mut new_i = Array1::zeros(state.n_groups());
    Zip::from(&mut new_i)
        .and(&pressure)
        .and(&state.s)
        .and(&state.i)
        .and(&state.r)
        .for_each(|new, &force, &s, &i, &r| {
            let total = s + i + r;
            let frac_s = if total > 0.0 { s / total } else { 0.0 };
            *new = (force * frac_s).min(s);
        });

    let a = &params.infection_discovery;
    let r = &params.recovered_discovery;

    let s = &state.s - &new_i;
    let recovered = &state.r + &state.i;
    let d = &state.d + &(a * &new_i) + &(r * &state.h);
    let h = &(a.mapv(|x| 1.0 - x) * &new_i) + &(r.mapv(|x| 1.0 - x) * &state.h);

    State {
        s,
        i: new_i,
        r: recovered,
        d,
        h,
    }
}

/// Generation-stepped recursion over a fixed horizon.
///
/// Rows of the trajectory are written once, in order, and never revisited.
#[derive(Debug, Clone)]
pub struct Engine {
    traj: Trajectory,
    state: State,
    t: usize,
}

impl Engine {
    /// Seed the engine with the generation-0 state.
    pub fn new(
        population: &Population,
        initial: State,
        horizon: usize,
    ) -> Result<Self, ConfigError> {
        if horizon == 0 {
            return Err(ConfigError::Invalid("horizon must be at least 1".to_string()));
        }
        initial.validate(population.n_groups())?;

        let mut traj = Trajectory::new(population, horizon);
        traj.write_row(0, &initial);

        Ok(Self {
            traj,
            state: initial,
            t: 0,
        })
    }

    /// Index of the last generation written.
    pub fn generation(&self) -> usize {
        self.t
    }

    pub fn remaining(&self) -> usize {
        self.traj.horizon() - self.t
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Step `n_steps` generations forward under `params`.
    pub fn run(&mut self, params: &StepParams, n_steps: usize) -> Result<(), ConfigError> {
        params.validate(self.state.n_groups())?;
        if n_steps > self.remaining() {
            return Err(ConfigError::Invalid(format!(
                "cannot step {n_steps} generations, only {} remain",
                self.remaining()
            )));
        }

        for _ in 0..n_steps {
            self.perform_step(params);
        }

        Ok(())
    }

    fn perform_step(&mut self, params: &StepParams) {
        self.state = step(&self.state, params);
        self.t += 1;
        self.traj.write_row(self.t, &self.state);
    }

    pub fn finish(self) -> Trajectory {
        self.traj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::MetaGroup;
    use crate::model::Compartment;
    use ndarray::array;
    use proptest::prelude::*;

    fn single_group(size: f64) -> Population {
        let mg = MetaGroup::new("test", size, vec![1.0], vec![1.0]).unwrap();
        Population::new(vec![mg], array![[1.0]]).unwrap()
    }

    fn initial(s: Vec<f64>, i: Vec<f64>, r: Vec<f64>) -> State {
        let i = Array1::from(i);
        let r = Array1::from(r);
        State {
            s: Array1::from(s),
            d: Array1::zeros(i.len()),
            h: &i + &r,
            i,
            r,
        }
    }

    fn params(interaction: Array2<f64>, outside: Array1<f64>, a: f64, r: f64) -> StepParams {
        let k = outside.len();
        StepParams {
            interaction,
            outside,
            infection_discovery: Array1::from_elem(k, a),
            recovered_discovery: Array1::from_elem(k, r),
        }
    }

    #[test]
    fn no_interaction_means_no_new_infections() {
        let pop = single_group(101.0);
        let mut engine = Engine::new(&pop, initial(vec![100.0], vec![1.0], vec![0.0]), 10).unwrap();
        engine
            .run(&params(array![[0.0]], array![0.0], 0.0, 0.0), 10)
            .unwrap();
        let traj = engine.finish();

        assert_eq!(traj.get(Compartment::I)[[0, 0]], 1.0);
        for t in 1..=10 {
            assert_eq!(traj.get(Compartment::I)[[t, 0]], 0.0);
            assert_eq!(traj.get(Compartment::S)[[t, 0]], 100.0);
            assert_eq!(traj.get(Compartment::R)[[t, 0]], 1.0);
            assert_eq!(traj.get(Compartment::D)[[t, 0]], 0.0);
        }
    }

    #[test]
    fn recursion_matches_hand_computation() {
        let state = initial(vec![80.0], vec![10.0], vec![10.0]);
        let next = step(&state, &params(array![[2.0]], array![5.0], 0.5, 0.25));
        // (10 * 2 + 5) * 80 / 100
        assert_eq!(next.i, array![20.0]);
        assert_eq!(next.s, array![60.0]);
        assert_eq!(next.r, array![20.0]);
        assert_eq!(next.d, array![10.0 + 5.0]);
        assert_eq!(next.h, array![10.0 + 15.0]);
    }

    #[test]
    fn saturation_caps_new_infections_at_susceptibles() {
        let state = initial(vec![5.0], vec![90.0], vec![5.0]);
        let next = step(&state, &params(array![[50.0]], array![1000.0], 1.0, 1.0));
        assert_eq!(next.i, array![5.0]);
        assert_eq!(next.s, array![0.0]);
    }

    #[test]
    fn emptied_group_receives_nothing() {
        let state = State::zeros(1);
        let next = step(&state, &params(array![[3.0]], array![7.0], 0.5, 0.5));
        assert_eq!(next.i, array![0.0]);
        assert!(next.s.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn zero_discovery_keeps_everyone_hidden() {
        let mg = MetaGroup::new("ug", 100.0, vec![0.0, 1.0, 2.0], vec![1.0 / 3.0; 3]).unwrap();
        let pop = Population::new(vec![mg], array![[1.0]]).unwrap();
        let interaction = pop.interaction_matrix(array![1.0].view()).unwrap();
        let sizes = pop.sizes();
        let i0 = array![0.0, 1.0, 1.0];
        let r0 = array![10.0, 10.0, 10.0];
        let s0 = &sizes - &i0 - &r0;
        let init = initial(s0.to_vec(), i0.to_vec(), r0.to_vec());

        let mut engine = Engine::new(&pop, init, 20).unwrap();
        engine
            .run(&params(interaction, Array1::zeros(3), 0.0, 0.0), 20)
            .unwrap();
        let traj = engine.finish();

        assert!(traj.get(Compartment::D).iter().all(|&d| d == 0.0));
        // The level-0 group never becomes infected.
        assert!((1..=20).all(|t| traj.get(Compartment::I)[[t, 0]] == 0.0));
    }

    #[test]
    fn periods_carry_state_over() {
        let pop = single_group(100.0);
        let mut engine = Engine::new(&pop, initial(vec![90.0], vec![10.0], vec![0.0]), 4).unwrap();
        let strong = params(array![[1.5]], array![0.0], 0.5, 0.5);
        let weak = params(array![[0.5]], array![0.0], 0.0, 0.0);
        engine.run(&strong, 2).unwrap();
        let mid = engine.state().clone();
        engine.run(&weak, 2).unwrap();
        let traj = engine.finish();

        assert_eq!(traj.row(2), mid);
        assert_eq!(traj.row(3), step(&mid, &weak));
    }

    #[test]
    fn horizon_is_enforced() {
        let pop = single_group(100.0);
        let mut engine = Engine::new(&pop, initial(vec![99.0], vec![1.0], vec![0.0]), 3).unwrap();
        let p = params(array![[1.0]], array![0.0], 0.0, 0.0);
        assert!(engine.run(&p, 4).is_err());
        engine.run(&p, 3).unwrap();
        assert_eq!(engine.remaining(), 0);
        assert!(Engine::new(&pop, State::zeros(1), 0).is_err());
    }

    #[test]
    fn invalid_params_are_rejected() {
        let pop = single_group(100.0);
        let mut engine = Engine::new(&pop, initial(vec![99.0], vec![1.0], vec![0.0]), 3).unwrap();
        assert!(engine.run(&params(array![[1.0]], array![0.0], 1.5, 0.0), 1).is_err());
        assert!(engine.run(&params(array![[-1.0]], array![0.0], 0.5, 0.0), 1).is_err());
        assert!(Engine::new(&pop, State::zeros(2), 3).is_err());
    }

    fn arb_system() -> impl Strategy<Value = (State, StepParams)> {
        (1usize..5).prop_flat_map(|k| {
            (
                prop::collection::vec(0.0f64..1000.0, k),
                prop::collection::vec(0.0f64..100.0, k),
                prop::collection::vec(0.0f64..100.0, k),
                prop::collection::vec(0.0f64..50.0, k * k),
                prop::collection::vec(0.0f64..500.0, k),
                prop::collection::vec(0.0f64..=1.0, k),
                prop::collection::vec(0.0f64..=1.0, k),
            )
                .prop_map(move |(s, i, r, inter, outside, a, rd)| {
                    let state = initial(s, i, r);
                    let params = StepParams {
                        interaction: Array2::from_shape_vec((k, k), inter).unwrap(),
                        outside: Array1::from(outside),
                        infection_discovery: Array1::from(a),
                        recovered_discovery: Array1::from(rd),
                    };
                    (state, params)
                })
        })
    }

    proptest! {
        #[test]
        fn invariants_hold_for_every_generation((state, params) in arb_system()) {
            let mut current = state;
            let size = &current.s + &current.i + &current.r;
            for _ in 0..10 {
                let next = step(&current, &params);
                for g in 0..next.n_groups() {
                    prop_assert!(next.i[g] <= current.s[g]);
                    prop_assert!(next.i[g] >= 0.0);
                    let total = next.s[g] + next.i[g] + next.r[g];
                    prop_assert!((total - size[g]).abs() <= 1e-9 * size[g].max(1.0));
                    let split = next.d[g] + next.h[g];
                    prop_assert!((split - (next.i[g] + next.r[g])).abs() <= 1e-9 * split.max(1.0));
                }
                current = next;
            }
        }
    }
}
