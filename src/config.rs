use crate::model::Payoff;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};
use thiserror::Error;

/// Model parameters shared by every run of a simulation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Baseline energy supplied per round.
    pub energy_import: f64,

    /// Number of rounds between strategy revisions.
    pub update_frequency: usize,
    /// Probability that an agent of the worse cohort switches at a revision.
    pub switch_probability: f64,

    /// Payoff coefficients.
    #[serde(default)]
    pub payoff: Payoff,
}

/// Initial population parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    /// Population size.
    pub n_agents: usize,
    /// Initial fraction of cooperating agents (truncated to a count).
    pub initial_push_frac: f64,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Number of rounds per run.
    pub n_rounds: usize,
    /// Seed shared by every run. Drawn from the OS when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,
    pub init: InitConfig,
    pub output: OutputConfig,
}

/// Configuration rejected by validation.
#[derive(Debug, Error)]
#[error("invalid configuration: {reason}")]
pub struct InvalidConfiguration {
    pub reason: String,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or deserialized,
    /// or [`InvalidConfiguration`] if the values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate()?;

        Ok(config)
    }

    /// Check every parameter, reporting the first violation.
    pub fn validate(&self) -> Result<(), InvalidConfiguration> {
        self.check().map_err(|err| InvalidConfiguration {
            reason: format!("{err:#}"),
        })
    }

    fn check(&self) -> Result<()> {
        let model = &self.model;
        check_pos(model.energy_import).context("invalid energy import")?;
        check_num(model.update_frequency, 1..).context("invalid update frequency")?;
        check_num(model.switch_probability, 0.0..=1.0).context("invalid switch probability")?;
        check_payoff(&model.payoff).context("invalid payoff coefficients")?;

        check_num(self.init.n_agents, 2..).context("invalid number of agents")?;
        check_num(self.init.initial_push_frac, 0.0..=1.0)
            .context("invalid initial cooperating fraction")?;

        check_num(self.output.n_rounds, 1..).context("invalid number of rounds")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_pos(num: f64) -> Result<()> {
    if !(num.is_finite() && num > 0.0) {
        bail!("number must be finite and positive, but is {num:?}");
    }
    Ok(())
}

fn check_payoff(payoff: &Payoff) -> Result<()> {
    let coefs = [
        ("alpha", payoff.alpha),
        ("beta", payoff.beta),
        ("gamma", payoff.gamma),
        ("epsilon", payoff.epsilon),
        ("delta", payoff.delta),
    ];
    for (name, coef) in coefs {
        if !coef.is_finite() {
            bail!("{name} must be finite, but is {coef:?}");
        }
    }
    Ok(())
}
