use crate::model::Trajectory;
use crate::stats::{self, TimeSeriesReport};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Summary of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n_rounds: usize,

    pub final_push_fraction: f64,
    pub final_avg_utility: f64,
    pub final_total_value: f64,

    /// Equilibrated cooperating fraction.
    pub push_fraction: TimeSeriesReport,
}

impl Summary {
    pub fn new(traj: &Trajectory) -> Result<Self> {
        let last = traj.last().context("trajectory has no rounds")?;
        Ok(Self {
            n_rounds: traj.len(),
            final_push_fraction: last.push_fraction,
            final_avg_utility: last.avg_utility,
            final_total_value: last.total_value,
            push_fraction: stats::report(&traj.push_fraction),
        })
    }

    pub fn log(&self, label: &str) {
        log::info!("{label} system:");
        log::info!("  final cooperating fraction: {:.1}%", 100.0 * self.final_push_fraction);
        log::info!("  final average utility:      {:.2}", self.final_avg_utility);
        log::info!("  final total value:          {:.2}", self.final_total_value);
        log::info!(
            "  equilibrium cooperating fraction: {:.4} +/- {:.4} (from round {})",
            self.push_fraction.mean,
            self.push_fraction.sem,
            self.push_fraction.i_equil
        );
    }
}

/// Differences between an open and a closed run (open minus closed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub push_fraction_gap: f64,
    pub avg_utility_gap: f64,
    pub total_value_gap: f64,
}

impl Comparison {
    pub fn new(open: &Summary, closed: &Summary) -> Self {
        Self {
            push_fraction_gap: open.final_push_fraction - closed.final_push_fraction,
            avg_utility_gap: open.final_avg_utility - closed.final_avg_utility,
            total_value_gap: open.final_total_value - closed.final_total_value,
        }
    }

    pub fn log(&self) {
        log::info!("open minus closed:");
        log::info!("  cooperating fraction: {:+.4}", self.push_fraction_gap);
        log::info!("  average utility:      {:+.2}", self.avg_utility_gap);
        log::info!("  total value:          {:+.2}", self.total_value_gap);
    }
}

/// Results written by the `analyze` command.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub open: Option<Summary>,
    pub closed: Option<Summary>,
    pub comparison: Option<Comparison>,
}

impl Results {
    pub fn new(open: Option<Summary>, closed: Option<Summary>) -> Self {
        let comparison = match (&open, &closed) {
            (Some(open), Some(closed)) => Some(Comparison::new(open, closed)),
            _ => None,
        };
        Self {
            open,
            closed,
            comparison,
        }
    }
}
