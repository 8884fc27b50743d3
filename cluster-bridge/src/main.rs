//! Cluster Bridge
//!
//! Runs the telemetry fusion engine on a fixed cadence and writes one JSON
//! record per tick to stdout for the instrument cluster UI. Logs go to stderr.
//!
//! Inputs are wired from the config file and command line:
//! - battery: a sysfs hwmon pack monitor, or synthetic samples
//! - CAN: a candump log replayed a bounded batch per tick
//! - direction: the drive-mode snapshot file, or the motion fallback

use anyhow::{Context, Result};
use clap::Parser;
use cluster_fusion::formats::CandumpFrameIterator;
use cluster_fusion::{Collaborators, FusedTelemetryRecord, TelemetryFusion};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

mod config;
mod sources;

use config::{AppConfig, Overrides};
use sources::{load_replay, HwmonBatterySource};

/// Cluster Bridge - fuse vehicle telemetry for the instrument cluster
#[derive(Parser, Debug)]
#[command(name = "cluster-bridge")]
#[command(about = "Fuse battery, CAN and drive-mode inputs into JSON telemetry", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (bridge.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds between records
    #[arg(short, long, value_name = "SECONDS")]
    interval: Option<f64>,

    /// Drive-mode snapshot file written by the control process
    #[arg(long, value_name = "FILE", conflicts_with = "no_snapshot")]
    snapshot: Option<PathBuf>,

    /// Ignore the drive-mode snapshot file
    #[arg(long)]
    no_snapshot: bool,

    /// candump log to replay as the CAN bus
    #[arg(long, value_name = "FILE")]
    can_replay: Option<PathBuf>,

    /// hwmon directory of the battery monitor
    #[arg(long, value_name = "DIR")]
    hwmon: Option<PathBuf>,

    /// Force the pack cell count (2, 3 or 4) instead of detecting it
    #[arg(long, value_name = "COUNT")]
    cells: Option<u8>,

    /// Stop after this many records
    #[arg(long, value_name = "COUNT")]
    ticks: Option<u64>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            interval: self.interval,
            snapshot: self.snapshot.clone(),
            no_snapshot: self.no_snapshot,
            can_replay: self.can_replay.clone(),
            hwmon: self.hwmon.clone(),
            cells: self.cells,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Cluster Bridge v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using fusion library v{}", cluster_fusion::VERSION);

    let config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let config = config.with_overrides(&args.overrides())?;

    let collaborators = build_collaborators(&config)?;
    print_banner(&config, &collaborators);

    let interval = config.fusion.tick_interval();
    let mut fusion = TelemetryFusion::new(config.fusion, collaborators)
        .context("Failed to start fusion engine")?;

    let stdout = io::stdout();
    let mut ticks: u64 = 0;
    loop {
        let started = Instant::now();

        let record = fusion.tick();
        emit(&mut stdout.lock(), &record).context("Failed to write telemetry record")?;

        ticks += 1;
        if args.ticks.is_some_and(|limit| ticks >= limit) {
            log::info!("Stopping after {} records", ticks);
            break;
        }

        std::thread::sleep(interval.saturating_sub(started.elapsed()));
    }

    Ok(())
}

/// Wire the inputs named by the configuration
fn build_collaborators(config: &AppConfig) -> Result<Collaborators> {
    let mut collaborators = Collaborators::new();

    if let Some(dir) = &config.bridge.hwmon_dir {
        if let Some(monitor) = HwmonBatterySource::open(dir) {
            collaborators = collaborators.with_battery(monitor);
        }
    }

    if let Some(path) = &config.bridge.can_replay {
        let queue = load_replay::<CandumpFrameIterator>(path)?;
        collaborators = collaborators.with_can(queue);
    }

    Ok(collaborators)
}

fn print_banner(config: &AppConfig, collaborators: &Collaborators) {
    log::info!("Cluster Bridge started");
    log::info!("Update interval: {}s", config.fusion.tick_interval_seconds);
    log::info!("Vehicle type: {}", config.bridge.vehicle_type);
    log::info!("Inputs: {}", collaborators.describe());
    match &config.fusion.drive_mode.snapshot_path {
        Some(path) => log::info!("Drive-mode snapshot: {:?}", path),
        None => log::info!("Drive-mode snapshot: disabled"),
    }
    log::info!("{}", "-".repeat(50));
}

/// Write one record as a JSON line and flush it to the reader
fn emit<W: Write>(out: &mut W, record: &FusedTelemetryRecord) -> Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
