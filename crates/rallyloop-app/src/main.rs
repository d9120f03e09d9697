//! Rallyloop experiment runner
//!
//! Runs one closed-loop stimulation session against simulated sensors and
//! electrodes and writes the per-tick log as CSV.
//!
//! # Usage
//!
//! ```bash
//! # Sensed stimulus only (default)
//! rallyloop --output session.csv
//!
//! # Alternate 120 s sensed / 60 s randomized
//! rallyloop hybrid --normal-secs 120 --random-secs 60
//!
//! # Channel 3 on 2 s / off 1 s for 5 minutes
//! rallyloop duty --on-secs 2 --off-secs 1 --total-secs 300 --channel 3
//!
//! # Settings from a file, stop after a minute
//! rallyloop --config session.toml --time-limit 60
//! ```

mod config;
mod csv_log;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use rallyloop_bridge::config::{ExperimentConfig, SessionConfig};
use rallyloop_bridge::record::{NullRecordSink, RecordSink};
use rallyloop_bridge::simulated::{SimulatedElectrodes, SimulatedSensorArray};
use rallyloop_bridge::{Session, SessionReport};
use rallyloop_core::types::STIM_CHANNELS;

use crate::config::ExperimentChoice;
use crate::csv_log::CsvRecordSink;

/// Rallyloop closed-loop stimulation runner
#[derive(Parser, Debug)]
#[command(name = "rallyloop")]
#[command(author, version, about = "Closed-loop bio-feedback stimulation runner", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// TOML session configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RNG seed for launch angles and random patterns
    #[arg(long)]
    seed: Option<u64>,

    /// Write the per-tick log to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    time_limit: Option<f64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stimulus always follows the ball (default if no subcommand)
    Feedback,

    /// Alternate sensed and randomized stimulus
    Hybrid {
        /// Seconds of sensed stimulus per cycle
        #[arg(long)]
        normal_secs: f64,

        /// Seconds of randomized stimulus per cycle
        #[arg(long)]
        random_secs: f64,
    },

    /// Drive one channel on/off for a bounded time, without the simulation
    Duty {
        /// Seconds on
        #[arg(long)]
        on_secs: f64,

        /// Seconds off
        #[arg(long)]
        off_secs: f64,

        /// Total seconds before stopping
        #[arg(long)]
        total_secs: f64,

        /// Channel to drive
        #[arg(long, default_value = "0")]
        channel: usize,
    },
}

impl Commands {
    fn experiment(&self) -> ExperimentConfig {
        match *self {
            Self::Feedback => ExperimentConfig::Feedback,
            Self::Hybrid {
                normal_secs,
                random_secs,
            } => ExperimentConfig::Hybrid {
                normal_s: normal_secs,
                random_s: random_secs,
            },
            Self::Duty {
                on_secs,
                off_secs,
                total_secs,
                channel,
            } => ExperimentConfig::DutyCycle {
                on_s: on_secs,
                off_s: off_secs,
                total_s: total_secs,
                channel,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Rallyloop v{}", env!("CARGO_PKG_VERSION"));

    let file = cli.config.as_deref().map(config::load_file).transpose()?;
    let choice = cli
        .command
        .as_ref()
        .map_or(ExperimentChoice::FromConfig, |c| ExperimentChoice::Explicit(c.experiment()));
    let session_config = config::resolve(file, choice, cli.seed);

    let time_limit = match cli.time_limit {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid time limit {secs}"))?,
        ),
        None => None,
    };

    let rt = Runtime::new()?;
    let report = rt.block_on(run(session_config, cli.output, time_limit))?;
    log_report(&report);

    Ok(())
}

/// Start the session and wait for it to end, Ctrl-C, or the time limit.
async fn run(
    config: SessionConfig,
    output: Option<PathBuf>,
    time_limit: Option<Duration>,
) -> anyhow::Result<SessionReport> {
    let records: Box<dyn RecordSink> = match &output {
        Some(path) => {
            info!("Logging to {}", path.display());
            Box::new(
                CsvRecordSink::create(path, config.calibration.len(), config.wire_format)
                    .with_context(|| format!("failed to create {}", path.display()))?,
            )
        }
        None => Box::new(NullRecordSink),
    };

    // No hardware bindings ship with the runner
    let sensors = SimulatedSensorArray::new(config.calibration.len())
        .with_calibration(&config.calibration);
    let electrodes = SimulatedElectrodes::new(STIM_CHANNELS);

    let handle = Session::begin(config, sensors, electrodes, records)?;
    let stop = handle.stop_signal();
    let mut join = tokio::task::spawn_blocking(move || handle.join());

    let limit = async {
        match time_limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    let joined = tokio::select! {
        joined = &mut join => joined,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted, stopping session");
            stop.raise();
            join.await
        }
        () = limit => {
            info!("Time limit reached, stopping session");
            stop.raise();
            join.await
        }
    };

    Ok(joined.context("session join task failed")??)
}

fn log_report(report: &SessionReport) {
    let a = &report.actuation;
    info!(
        ticks = a.ticks,
        fresh = a.fresh_samples,
        held = a.held_samples,
        applies = a.applies,
        apply_faults = a.apply_faults,
        forced_releases = a.forced_releases,
        mode_switches = a.mode_switches,
        records = a.records,
        budget_exhausted = a.budget_exhausted,
        "Actuation summary"
    );
    if let Some(sim) = &report.simulation {
        info!(
            frames = sim.frames,
            hits = sim.hits,
            misses = sim.misses,
            best_rally = sim.best_rally,
            overruns = sim.overruns,
            "Simulation summary"
        );
    }
    if a.record_faults > 0 {
        warn!("{} log records could not be written", a.record_faults);
    }
}
