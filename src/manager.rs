use crate::analysis::{Results, Summary};
use crate::config::Config;
use crate::engine::{self, EnergySupply};
use crate::model::Trajectory;
use anyhow::{Context, Result};
use glob::glob;
use rand::prelude::*;
use rmp_serde::{decode, encode};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

const SUPPLIES: [EnergySupply; 2] = [EnergySupply::Open, EnergySupply::Closed];

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Run the given supply policy, or both with a shared seed.
    pub fn run_simulations(&self, supply: Option<EnergySupply>) -> Result<()> {
        let seed = match self.cfg.output.seed {
            Some(seed) => seed,
            None => rand::rng().random(),
        };
        log::info!("using seed {seed}");

        let supplies = match supply {
            Some(supply) => vec![supply],
            None => SUPPLIES.to_vec(),
        };

        for supply in supplies {
            let traj = engine::simulate(&self.cfg, supply, seed)
                .with_context(|| format!("failed to simulate {supply} system"))?;

            let file = self.trajectory_file(supply);
            save_trajectory(&traj, &file).with_context(|| format!("failed to save {file:?}"))?;
            log::info!("saved {} rounds to {file:?}", traj.len());

            Summary::new(&traj)
                .context("failed to summarize trajectory")?
                .log(&supply.to_string());
        }

        Ok(())
    }

    pub fn run_analysis(&self) -> Result<()> {
        let mut summaries = Vec::with_capacity(SUPPLIES.len());
        for supply in SUPPLIES {
            let file = self.trajectory_file(supply);
            if !file.is_file() {
                log::warn!("missing {file:?}");
                summaries.push(None);
                continue;
            }

            let traj =
                load_trajectory(&file).with_context(|| format!("failed to load {file:?}"))?;
            let summary = Summary::new(&traj).context("failed to summarize trajectory")?;
            summary.log(&supply.to_string());
            summaries.push(Some(summary));
        }

        let closed = summaries.pop().flatten();
        let open = summaries.pop().flatten();
        let results = Results::new(open, closed);
        if let Some(comparison) = &results.comparison {
            comparison.log();
        }

        let file = self.results_file();
        let file = File::create(&file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &results).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    pub fn clean_outputs(&self) -> Result<()> {
        let pattern = self.sim_dir.join("*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for file in glob(pattern).context("failed to glob output files")? {
            let file = file.context("failed to read glob entry")?;
            fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
            log::info!("removed {file:?}");
        }
        Ok(())
    }

    fn trajectory_file(&self, supply: EnergySupply) -> PathBuf {
        self.sim_dir.join(format!("trajectory-{supply}.msgpack"))
    }

    fn results_file(&self) -> PathBuf {
        self.sim_dir.join("results.msgpack")
    }
}

fn save_trajectory(traj: &Trajectory, file: &Path) -> Result<()> {
    let file = File::create(file).context("failed to create file")?;
    let mut writer = BufWriter::new(file);
    encode::write(&mut writer, traj).context("failed to serialize trajectory")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

fn load_trajectory(file: &Path) -> Result<Trajectory> {
    let file = File::open(file).context("failed to open file")?;
    let mut reader = BufReader::new(file);
    let traj = decode::from_read(&mut reader).context("failed to deserialize trajectory")?;
    Ok(traj)
}
