use crate::stats::{Accumulator, AccumulatorReport, SeriesAccumulator, SeriesReport};
use anyhow::{Context, Result, bail};
use ndarray::Array1;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use simpar::scenario::SimOutput;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObsReport {
    Series(SeriesReport),
    Scalar(AccumulatorReport),
}

pub trait Obs {
    fn name(&self) -> &'static str;
    fn update(&mut self, out: &SimOutput) -> Result<()>;
    fn report(&self) -> ObsReport;
}

/// Mean and spread across runs of a per-generation series.
pub struct SeriesObs {
    name: &'static str,
    extract: fn(&SimOutput) -> Result<Array1<f64>>,
    acc: SeriesAccumulator,
}

impl SeriesObs {
    pub fn new(
        name: &'static str,
        horizon: usize,
        extract: fn(&SimOutput) -> Result<Array1<f64>>,
    ) -> Self {
        Self {
            name,
            extract,
            acc: SeriesAccumulator::new(horizon + 1),
        }
    }
}

impl Obs for SeriesObs {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(&mut self, out: &SimOutput) -> Result<()> {
        let series = (self.extract)(out)?;
        if !self.acc.add(series.iter()) {
            bail!(
                "{} has {} generations, expected {}",
                self.name,
                series.len(),
                self.acc.len()
            );
        }
        Ok(())
    }

    fn report(&self) -> ObsReport {
        ObsReport::Series(self.acc.report())
    }
}

pub struct PeakIsolation {
    acc: Accumulator,
}

impl PeakIsolation {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for PeakIsolation {
    fn name(&self) -> &'static str {
        "peak_isolation"
    }

    fn update(&mut self, out: &SimOutput) -> Result<()> {
        self.acc.add(out.isolation.peak());
        Ok(())
    }

    fn report(&self) -> ObsReport {
        ObsReport::Scalar(self.acc.report())
    }
}

/// Collects the observables of one strategy across runs.
pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(horizon: usize) -> Self {
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = Vec::new();
        obs_ptr_vec.push(Box::new(SeriesObs::new(
            "cumulative_infections",
            horizon,
            |out| Ok(out.cumulative_infections(None)?),
        )));
        obs_ptr_vec.push(Box::new(SeriesObs::new("discovered", horizon, |out| {
            Ok(out.discovered(None)?)
        })));
        obs_ptr_vec.push(Box::new(SeriesObs::new("isolated", horizon, |out| {
            Ok(out.isolation.total())
        })));
        obs_ptr_vec.push(Box::new(SeriesObs::new(
            "cumulative_hospitalizations",
            horizon,
            |out| Ok(out.hospitalizations(None, true)?),
        )));
        obs_ptr_vec.push(Box::new(PeakIsolation::new()));
        Self { obs_ptr_vec }
    }

    pub fn add(&mut self, out: &SimOutput) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(out)
                .with_context(|| format!("failed to update {}", obs.name()))?;
        }
        Ok(())
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let out: SimOutput = decode::from_read(&mut reader).context("failed to read output")?;
        self.add(&out)
    }

    pub fn report(&self) -> BTreeMap<String, ObsReport> {
        self.obs_ptr_vec
            .iter()
            .map(|obs| (obs.name().to_string(), obs.report()))
            .collect()
    }
}

/// Write the reports of every strategy to a MessagePack file.
pub fn save_results<P: AsRef<Path>>(
    file: P,
    results: &BTreeMap<String, BTreeMap<String, ObsReport>>,
) -> Result<()> {
    let file = file.as_ref();
    let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(file);
    encode::write_named(&mut writer, results).context("failed to serialize results")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}
