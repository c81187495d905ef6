//! Single run of the Activity Based Costing Analysis (ABCA) model.
//!
//! Prints the schema, the status after reset, the status after one action
//! and the outputs. Arguments are passed through as given; the model decides
//! what to do with out-of-range values.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::info;

use crate::config::SimConfig;
use crate::constants::JavaLogLevel;
use crate::data::EngineOverrides;
use crate::outputs::format_outputs;
use crate::sim::{AnyLogicSim, SimOptions, Simulation};
use crate::units::{TimeUnits, UnitValue};

/// Where the exported model is expected, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "ModelExported/model.jar";

const SEPARATOR: &str = "=========================";

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Missing file '{0}'. To fix, create the folder if it does not exist and export/unzip in-place.")]
    MissingModel(String),
}

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(
    name = "ABCA-SingleRun",
    allow_negative_numbers = true,
    about = "Execute a single run of the ABCA model, printing at least the before/after run status and outputs to the console."
)]
pub struct RunArgs {
    /// RNG seed
    #[arg(short = 's', long, default_value_t = 1)]
    pub seed: i64,

    /// Arrival rate (per day); typical range [0.1, 2]
    #[arg(short = 'r', long, default_value_t = 1.0)]
    pub rate: f64,

    /// Number of Resource A agents; typical range [1, 20]
    #[arg(short = 'a', long = "num-a", default_value_t = 10)]
    pub num_a: i64,

    /// Number of Resource B agents; typical range [1, 20]
    #[arg(short = 'b', long = "num-b", default_value_t = 10)]
    pub num_b: i64,

    /// Delay (seconds) of machine; typical range [1, 12]
    #[arg(short = 'd', long, default_value_t = 1.0)]
    pub delay: f64,

    /// Speed (m/s) of conveyor; typical range [1e-6, 15]
    #[arg(short = 'c', long, default_value_t = 0.001)]
    pub speed: f64,

    /// Size of auxiliary queues before each resource's seize block; typical size [1, 90]
    #[arg(short = 'q', long, default_value_t = 90)]
    pub queue: i64,

    /// Stop time (days)
    #[arg(short = 't', long = "stop-time", default_value_t = 180.0)]
    pub stop_time: f64,

    /// Do not execute a simulation run (i.e., only print schema and quit)
    #[arg(long = "no-run", conflicts_with = "no_schema")]
    pub no_run: bool,

    /// Suppress schema from being printed
    #[arg(long = "no-schema")]
    pub no_schema: bool,

    /// Exported model (model.jar, its folder, or the exported zip)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Local port for the model server (0 picks a free port)
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    /// Log level of the model server (overrides ALPYNE_JAVA_LOG_LEVEL)
    #[arg(long = "java-log-level", value_enum, ignore_case = true)]
    pub java_log_level: Option<JavaLogLevel>,
}

impl RunArgs {
    /// Seed and stop time go to the engine; queue size is a configuration default.
    pub fn sim_options(&self) -> SimOptions {
        let mut config_defaults = Map::new();
        config_defaults.insert("sizeBufferQueues".to_string(), json!(self.queue));
        SimOptions {
            engine_overrides: EngineOverrides {
                seed: Some(self.seed),
                stop_time: Some(UnitValue::time(self.stop_time, TimeUnits::Day)),
                ..Default::default()
            },
            config_defaults,
            port: self.port,
            java_log_level: self.java_log_level,
            ..Default::default()
        }
    }

    pub fn reset_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert("arrivalRate".to_string(), json!(self.rate));
        config
    }

    pub fn action(&self) -> Map<String, Value> {
        let mut action = Map::new();
        action.insert("numResourceA".to_string(), json!(self.num_a));
        action.insert("numResourceB".to_string(), json!(self.num_b));
        action.insert("processDelay".to_string(), json!(self.delay));
        action.insert("conveyorSpeed".to_string(), json!(self.speed));
        action
    }
}

/// Fail fast when the exported model is not where the run expects it.
pub fn check_model_exists(path: &Path) -> Result<(), RunError> {
    if path.exists() {
        Ok(())
    } else {
        Err(RunError::MissingModel(path.display().to_string()))
    }
}

/// The whole single run: model check, server launch, run, shutdown.
pub async fn single_run<W: Write + Send>(
    args: &RunArgs,
    config: &SimConfig,
    out: &mut W,
) -> anyhow::Result<()> {
    check_model_exists(&args.model)?;

    let sim = AnyLogicSim::launch(&args.model, args.sim_options(), config).await?;
    let result = run(args, &sim, out).await;
    sim.close().await;
    result
}

/// Drive one run against `sim`, writing everything worth reading to `out`.
pub async fn run<S, W>(args: &RunArgs, sim: &S, out: &mut W) -> anyhow::Result<()>
where
    S: Simulation + ?Sized,
    W: Write + Send,
{
    if !args.no_schema {
        writeln!(out, "The model data schema is:\n")?;
        writeln!(out, "{}\n", sim.schema())?;
        writeln!(out, "{}\n", SEPARATOR)?;
    }
    if args.no_run {
        info!("--no-run given; skipping the simulation run");
        return Ok(());
    }

    let status = sim
        .reset(args.reset_config())
        .await
        .context("Failed to reset the simulation")?;
    writeln!(out, "The model has started with configuration:\n")?;
    writeln!(out, "{}\n", status)?;
    writeln!(out, "{}\n", SEPARATOR)?;

    let status = sim
        .take_action(args.action())
        .await
        .context("Failed to take the action")?;
    writeln!(out, "The model has ended with observation:\n")?;
    writeln!(out, "{}\n", status)?;
    writeln!(out, "{}\n", SEPARATOR)?;

    let outputs = sim
        .outputs(None)
        .await
        .context("Failed to query the outputs")?;
    writeln!(out, "Outputs of the model:\n")?;
    writeln!(out, "{}", format_outputs(&outputs))?;

    Ok(())
}
