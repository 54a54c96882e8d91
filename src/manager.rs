use crate::analysis::{Analyzer, save_results};
use anyhow::{Context, Result, bail};
use glob::glob;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rmp_serde::encode;
use serde::Serialize;
use simpar::config::Config;
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

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

    /// Draw a scenario and simulate every strategy in a new run directory.
    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let mut rng = match self.cfg.sampling.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed.wrapping_add(run_idx as u64)),
            None => ChaCha12Rng::try_from_os_rng()?,
        };
        let draw = self.cfg.draw(&mut rng).context("failed to draw scenario")?;
        log::info!("{draw:?}");
        write_file(run_dir.join("draw.msgpack"), &draw).context("failed to save draw")?;

        let scenario = self.cfg.scenario(draw).context("failed to build scenario")?;
        let counts = self.cfg.initial_counts();
        let strategies = self.cfg.strategies().context("failed to build strategies")?;
        for strategy in &strategies {
            let out = scenario
                .simulate(strategy, &counts, self.cfg.scenario.horizon)
                .with_context(|| format!("failed to simulate strategy '{}'", strategy.name()))?;

            let file = self.output_file(run_idx, strategy.name());
            write_file(&file, &out).with_context(|| format!("failed to save {file:?}"))?;
            log::info!("completed strategy '{}'", strategy.name());
        }

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        if n_runs == 0 {
            bail!("no runs to analyze");
        }

        let mut results = BTreeMap::new();
        for strat in &self.cfg.strategies {
            let mut analyzer = Analyzer::new(self.cfg.scenario.horizon);
            for run_idx in 0..n_runs {
                analyzer
                    .add_file(self.output_file(run_idx, &strat.name))
                    .context("failed to add file")?;
            }
            results.insert(strat.name.clone(), analyzer.report());
            log::info!("analyzed strategy '{}' over {n_runs} runs", strat.name);
        }

        save_results(self.analysis_file(), &results).context("failed to save results")?;

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for run_dir in glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
        {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        let analysis_file = self.analysis_file();
        if analysis_file.exists() {
            fs::remove_file(&analysis_file)
                .with_context(|| format!("failed to remove {analysis_file:?}"))?;
            log::info!("removed {analysis_file:?}");
        }

        Ok(())
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn output_file(&self, run_idx: usize, strategy: &str) -> PathBuf {
        self.run_dir(run_idx).join(format!("{strategy}.msgpack"))
    }

    fn analysis_file(&self) -> PathBuf {
        self.sim_dir.join("analysis.msgpack")
    }
}

fn write_file<P: AsRef<Path>, T: Serialize>(file: P, val: &T) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write(&mut writer, val).context("failed to serialize value")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}
