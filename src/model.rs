//! Simulation data types and the pairwise payoff rule.

use serde::{Deserialize, Serialize};

/// Behavioral strategy of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Produce value from the available energy.
    Cooperate,
    /// Siphon value from a cooperating partner.
    Extract,
}

/// Agent of the simulation.
///
/// `value` is the capital stock the agent has produced and kept, `utility` is
/// the accumulated payoff that drives strategy revision. Neither is ever reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub strategy: Strategy,
    pub value: f64,
    pub utility: f64,
}

impl Agent {
    /// Create a new agent with the given strategy and the initial accumulators.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            value: 1.0,
            utility: 0.0,
        }
    }
}

/// Payoff coefficients, fixed for a whole run.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Payoff {
    /// Benefit from own production.
    pub alpha: f64,
    /// Benefit from the partner's production.
    pub beta: f64,
    /// Fraction of a cooperator's production taken by an extractor.
    pub gamma: f64,
    /// Fixed cost of extracting.
    pub epsilon: f64,
    /// Penalty for being exploited.
    pub delta: f64,
}

impl Default for Payoff {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            beta: 0.3,
            gamma: 0.5,
            epsilon: 0.1,
            delta: 0.2,
        }
    }
}

/// Apply one interaction between two distinct agents.
///
/// Both agents share the round's `energy` figure. Extracted value is credited
/// to the extractor's `utility` only, never to its `value`.
pub fn interact(agt_a: &mut Agent, agt_b: &mut Agent, energy: f64, payoff: &Payoff) {
    use Strategy::*;
    match (agt_a.strategy, agt_b.strategy) {
        (Cooperate, Cooperate) => {
            let prod_a = energy;
            let prod_b = energy;
            agt_a.utility += payoff.alpha * prod_a + payoff.beta * prod_b;
            agt_b.utility += payoff.alpha * prod_b + payoff.beta * prod_a;
            agt_a.value += prod_a;
            agt_b.value += prod_b;
        }
        (Cooperate, Extract) => exploit(agt_a, agt_b, energy, payoff),
        (Extract, Cooperate) => exploit(agt_b, agt_a, energy, payoff),
        (Extract, Extract) => {}
    }
}

fn exploit(coop: &mut Agent, extr: &mut Agent, energy: f64, payoff: &Payoff) {
    let prod = energy;
    let extracted = payoff.gamma * prod;
    coop.utility += payoff.alpha * prod - payoff.delta;
    coop.value += prod - extracted;
    extr.utility += extracted - payoff.epsilon;
}

/// Aggregate statistics captured at the end of a round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Fraction of the population playing [`Strategy::Cooperate`].
    pub push_fraction: f64,
    /// Mean accumulated utility over all agents.
    pub avg_utility: f64,
    /// Sum of `value` over all agents.
    pub total_value: f64,
}

/// Output of a run: three index-aligned sequences, one entry per round.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub push_fraction: Vec<f64>,
    pub avg_utility: Vec<f64>,
    pub total_value: Vec<f64>,
}

impl Trajectory {
    pub fn with_capacity(n_rounds: usize) -> Self {
        Self {
            push_fraction: Vec::with_capacity(n_rounds),
            avg_utility: Vec::with_capacity(n_rounds),
            total_value: Vec::with_capacity(n_rounds),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.push_fraction.push(record.push_fraction);
        self.avg_utility.push(record.avg_utility);
        self.total_value.push(record.total_value);
    }

    pub fn len(&self) -> usize {
        self.push_fraction.len()
    }

    /// Record of the last round, if any.
    pub fn last(&self) -> Option<Record> {
        Some(Record {
            push_fraction: *self.push_fraction.last()?,
            avg_utility: *self.avg_utility.last()?,
            total_value: *self.total_value.last()?,
        })
    }
}
