use crate::config::Config;
use crate::model::{Agent, Record, Strategy, Trajectory, interact};
use crate::stats::Accumulator;
use anyhow::{Context, Result};
use clap::ValueEnum;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;
use std::fmt;

/// Fraction of the baseline supply lost by the end of a closed run.
const DEPLETION: f64 = 0.8;
/// Lowest energy a closed system ever supplies.
const MIN_ENERGY: f64 = 0.1;

/// Energy supply policy of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnergySupply {
    /// Constant external import.
    Open,
    /// Internal stock depleting linearly with time.
    Closed,
}

impl EnergySupply {
    /// Energy available at round `i_round` of a run lasting `n_rounds`.
    pub fn energy_at(self, energy_import: f64, i_round: usize, n_rounds: usize) -> f64 {
        match self {
            EnergySupply::Open => energy_import,
            EnergySupply::Closed => {
                let elapsed = i_round as f64 / n_rounds as f64;
                (energy_import * (1.0 - DEPLETION * elapsed)).max(MIN_ENERGY)
            }
        }
    }
}

impl fmt::Display for EnergySupply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergySupply::Open => write!(f, "open"),
            EnergySupply::Closed => write!(f, "closed"),
        }
    }
}

/// Simulation engine.
///
/// Owns the population and the random number generator of a single run.
pub struct Engine {
    cfg: Config,
    supply: EnergySupply,
    agt_vec: Vec<Agent>,
    switch_dist: Bernoulli,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the initial population.
    ///
    /// The first `n_agents * initial_push_frac` (truncated) agents cooperate,
    /// the rest extract.
    pub fn new(cfg: Config, supply: EnergySupply, rng: ChaCha12Rng) -> Result<Self> {
        cfg.validate()?;

        let n_agents = cfg.init.n_agents;
        let n_push = (n_agents as f64 * cfg.init.initial_push_frac) as usize;

        let agt_vec = (0..n_agents)
            .map(|i_agt| {
                let strategy = if i_agt < n_push {
                    Strategy::Cooperate
                } else {
                    Strategy::Extract
                };
                Agent::new(strategy)
            })
            .collect();

        let switch_dist = Bernoulli::new(cfg.model.switch_probability)
            .context("failed to construct switch distribution")?;

        Ok(Self {
            cfg,
            supply,
            agt_vec,
            switch_dist,
            rng,
        })
    }

    /// Perform every round and return the resulting trajectory.
    pub fn run(mut self) -> Trajectory {
        let n_rounds = self.cfg.output.n_rounds;
        log::info!(
            "running {} system with {} agents for {n_rounds} rounds",
            self.supply,
            self.agt_vec.len()
        );

        let mut traj = Trajectory::with_capacity(n_rounds);
        let progress_step = (n_rounds / 10).max(1);
        for i_round in 0..n_rounds {
            traj.push(self.perform_round(i_round));

            if (i_round + 1) % progress_step == 0 {
                let progress = 100.0 * (i_round + 1) as f64 / n_rounds as f64;
                log::info!("completed {progress:06.2}%");
            }
        }
        traj
    }

    fn perform_round(&mut self, i_round: usize) -> Record {
        let energy = self.supply.energy_at(
            self.cfg.model.energy_import,
            i_round,
            self.cfg.output.n_rounds,
        );

        self.pair_and_interact(energy);

        if i_round > 0 && i_round % self.cfg.model.update_frequency == 0 {
            self.revise_strategies(i_round);
        }

        self.record()
    }

    fn pair_and_interact(&mut self, energy: f64) {
        self.agt_vec.shuffle(&mut self.rng);

        // With an odd population the last agent sits the round out.
        let payoff = &self.cfg.model.payoff;
        for pair in self.agt_vec.chunks_exact_mut(2) {
            let [agt_a, agt_b] = pair else {
                unreachable!("chunks have exactly two agents")
            };
            interact(agt_a, agt_b, energy, payoff);
        }
    }

    fn revise_strategies(&mut self, i_round: usize) {
        let mut push_acc = Accumulator::new();
        let mut suck_acc = Accumulator::new();
        for agt in &self.agt_vec {
            match agt.strategy {
                Strategy::Cooperate => push_acc.add(agt.utility),
                Strategy::Extract => suck_acc.add(agt.utility),
            }
        }

        // Once a strategy is extinct it stays extinct.
        if push_acc.is_empty() || suck_acc.is_empty() {
            return;
        }

        let (avg_push, avg_suck) = (push_acc.mean(), suck_acc.mean());
        let (from, to) = if avg_suck < avg_push {
            (Strategy::Extract, Strategy::Cooperate)
        } else if avg_push < avg_suck {
            (Strategy::Cooperate, Strategy::Extract)
        } else {
            return;
        };

        let mut n_switched = 0;
        for agt in self.agt_vec.iter_mut().filter(|agt| agt.strategy == from) {
            if self.switch_dist.sample(&mut self.rng) {
                agt.strategy = to;
                n_switched += 1;
            }
        }
        log::debug!(
            "round {i_round}: {n_switched} agents switched from {from:?} to {to:?} \
             (mean utility {avg_push:.4} vs {avg_suck:.4})"
        );
    }

    fn record(&self) -> Record {
        let n_agents = self.agt_vec.len();
        let n_push = self
            .agt_vec
            .iter()
            .filter(|agt| agt.strategy == Strategy::Cooperate)
            .count();
        let utility_acc: Accumulator = self.agt_vec.iter().map(|agt| agt.utility).collect();
        Record {
            push_fraction: n_push as f64 / n_agents as f64,
            avg_utility: utility_acc.mean(),
            total_value: self.agt_vec.iter().map(|agt| agt.value).sum(),
        }
    }
}

/// Run one independent simulation with the given supply policy and seed.
pub fn simulate(cfg: &Config, supply: EnergySupply, seed: u64) -> Result<Trajectory> {
    let rng = ChaCha12Rng::seed_from_u64(seed);
    let engine = Engine::new(cfg.clone(), supply, rng).context("failed to construct engine")?;
    Ok(engine.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InvalidConfiguration, tests::test_config};

    const TOL: f64 = 1e-12;

    fn engine(cfg: Config, supply: EnergySupply) -> Engine {
        Engine::new(cfg, supply, ChaCha12Rng::seed_from_u64(7)).expect("failed to build engine")
    }

    fn count(engine: &Engine, strategy: Strategy) -> usize {
        engine
            .agt_vec
            .iter()
            .filter(|agt| agt.strategy == strategy)
            .count()
    }

    #[test]
    fn closed_energy_decays_linearly_to_floor() {
        let closed = EnergySupply::Closed;
        assert!((closed.energy_at(1.0, 0, 500) - 1.0).abs() < TOL);
        assert!((closed.energy_at(1.0, 250, 500) - 0.6).abs() < TOL);
        assert!((closed.energy_at(1.0, 499, 500) - 0.2016).abs() < 1e-9);
        assert!((closed.energy_at(0.2, 499, 500) - MIN_ENERGY).abs() < TOL);
        assert_eq!(EnergySupply::Open.energy_at(1.5, 499, 500), 1.5);
    }

    #[test]
    fn initial_population_is_truncated_and_ordered() {
        let mut cfg = test_config();
        cfg.init.n_agents = 7;
        cfg.init.initial_push_frac = 0.5;
        let engine = engine(cfg, EnergySupply::Open);

        assert_eq!(count(&engine, Strategy::Cooperate), 3);
        assert!(engine.agt_vec[..3].iter().all(|a| a.strategy == Strategy::Cooperate));
        assert!(engine.agt_vec[3..].iter().all(|a| a.strategy == Strategy::Extract));
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let mut cfg = test_config();
        cfg.init.n_agents = 1;
        let err = Engine::new(cfg, EnergySupply::Open, ChaCha12Rng::seed_from_u64(0))
            .err()
            .expect("engine should not be constructed");
        assert!(err.downcast_ref::<InvalidConfiguration>().is_some());
    }

    #[test]
    fn records_match_population() {
        let mut cfg = test_config();
        cfg.output.n_rounds = 60;
        let mut engine = engine(cfg, EnergySupply::Closed);
        let n_agents = engine.agt_vec.len();

        for i_round in 0..60 {
            let record = engine.perform_round(i_round);
            let n_push = count(&engine, Strategy::Cooperate);
            let n_suck = count(&engine, Strategy::Extract);

            assert_eq!(n_push + n_suck, n_agents);
            assert_eq!(record.push_fraction, n_push as f64 / n_agents as f64);
            assert!((0.0..=1.0).contains(&record.push_fraction));

            let total_value: f64 = engine.agt_vec.iter().map(|a| a.value).sum();
            assert!((record.total_value - total_value).abs() < TOL);
        }
    }

    #[test]
    fn odd_agent_sits_out_but_is_counted() {
        let mut cfg = test_config();
        cfg.init.n_agents = 3;
        cfg.init.initial_push_frac = 1.0;
        cfg.output.n_rounds = 1;
        let mut engine = engine(cfg, EnergySupply::Open);

        let record = engine.perform_round(0);

        let idle: Vec<_> = engine.agt_vec.iter().filter(|a| a.utility == 0.0).collect();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].value, 1.0);
        assert!((record.avg_utility - 2.0 / 3.0).abs() < TOL);
        assert!((record.total_value - 5.0).abs() < TOL);
    }

    #[test]
    fn extinct_strategy_never_returns() {
        let mut cfg = test_config();
        cfg.init.initial_push_frac = 0.0;
        cfg.model.switch_probability = 1.0;

        let traj = Engine::new(cfg, EnergySupply::Open, ChaCha12Rng::seed_from_u64(3))
            .expect("failed to build engine")
            .run();

        assert_eq!(traj.len(), 500);
        assert!(traj.push_fraction.iter().all(|&frac| frac == 0.0));
        assert!(traj.avg_utility.iter().all(|&util| util == 0.0));
    }

    #[test]
    fn zero_switch_probability_freezes_strategies() {
        let mut cfg = test_config();
        cfg.model.switch_probability = 0.0;
        cfg.model.update_frequency = 1;

        let traj = simulate(&cfg, EnergySupply::Closed, 11).expect("failed to simulate");

        assert!(traj.push_fraction.iter().all(|&frac| frac == 0.1));
    }

    #[test]
    fn worse_cohort_switches_with_certainty() {
        let mut cfg = test_config();
        cfg.init.n_agents = 10;
        cfg.init.initial_push_frac = 0.5;
        cfg.model.switch_probability = 1.0;
        let mut engine = engine(cfg, EnergySupply::Open);
        for agt in engine.agt_vec.iter_mut() {
            if agt.strategy == Strategy::Extract {
                agt.utility = 2.0;
            }
        }

        engine.revise_strategies(10);

        assert_eq!(count(&engine, Strategy::Extract), 10);
        assert!(engine.agt_vec.iter().all(|a| a.value == 1.0));
    }

    #[test]
    fn tied_cohorts_do_not_switch() {
        let mut cfg = test_config();
        cfg.init.n_agents = 10;
        cfg.init.initial_push_frac = 0.5;
        cfg.model.switch_probability = 1.0;
        let mut engine = engine(cfg, EnergySupply::Open);

        engine.revise_strategies(10);

        assert_eq!(count(&engine, Strategy::Cooperate), 5);
    }

    #[test]
    fn revision_waits_for_update_frequency() {
        let mut cfg = test_config();
        cfg.init.n_agents = 2;
        cfg.init.initial_push_frac = 0.5;
        cfg.model.switch_probability = 1.0;
        cfg.model.update_frequency = 3;
        let traj = simulate(&cfg, EnergySupply::Open, 5).expect("failed to simulate");

        // The cooperator out-earns its extractor, which converts at round 3.
        assert_eq!(&traj.push_fraction[..3], &[0.5, 0.5, 0.5]);
        assert_eq!(traj.push_fraction[3], 1.0);
    }

    #[test]
    fn same_seed_reproduces_run() {
        let cfg = test_config();
        let traj_a = simulate(&cfg, EnergySupply::Open, 99).expect("failed to simulate");
        let traj_b = simulate(&cfg, EnergySupply::Open, 99).expect("failed to simulate");
        assert_eq!(traj_a, traj_b);
    }

    #[test]
    fn open_supply_outperforms_closed() {
        let cfg = test_config();
        let open = simulate(&cfg, EnergySupply::Open, 42).expect("failed to simulate");
        let closed = simulate(&cfg, EnergySupply::Closed, 42).expect("failed to simulate");

        let open = open.last().expect("empty trajectory");
        let closed = closed.last().expect("empty trajectory");

        assert!(open.push_fraction > 0.5);
        assert!(open.push_fraction >= closed.push_fraction);
        assert!(open.avg_utility > closed.avg_utility);
        assert!(open.total_value > closed.total_value);
    }
}
