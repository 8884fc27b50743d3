//! Cluster Telemetry Fusion Library
//!
//! Fuses three independent vehicle inputs into one periodic telemetry record
//! for an instrument cluster display:
//! - Battery state of charge from a pack monitor (sag-compensated, smoothed)
//! - Vehicle speed and motor RPM from a CAN bus
//! - Drive direction (F/R/N) from a snapshot file, a gamepad, or motion
//!
//! # Architecture
//!
//! This library owns the estimation and arbitration logic only:
//! - [`battery`] maps pack voltage to a percentage and filters it
//! - [`decoder`] extracts speed and RPM from raw CAN frames
//! - [`drive_mode`] arbitrates the direction between its sources
//! - [`fusion`] runs one cycle and assembles the record
//!
//! Hardware access sits behind the traits in [`sources`]; the bridge binary
//! (cluster-bridge) wires them to sysfs, a candump replay, or nothing at all.
//!
//! # Example Usage
//!
//! ```no_run
//! use cluster_fusion::{Collaborators, FrameQueue, FusionConfig, TelemetryFusion};
//! use cluster_fusion::formats::CandumpParser;
//! use std::path::Path;
//!
//! let frames: FrameQueue = CandumpParser::parse(Path::new("trace.log"))
//!     .unwrap()
//!     .filter_map(|frame| frame.ok())
//!     .collect();
//!
//! let config = FusionConfig::new().with_tick_interval(0.5);
//! let collaborators = Collaborators::new().with_can(frames);
//! let mut fusion = TelemetryFusion::new(config, collaborators).unwrap();
//!
//! let record = fusion.tick();
//! println!("{}", serde_json::to_string(&record).unwrap());
//! ```

// Public modules
pub mod battery;
pub mod config;
pub mod decoder;
pub mod drive_mode;
pub mod formats;
pub mod fusion;
pub mod snapshot;
pub mod sources;
pub mod types;

// Re-export main types for convenience
pub use battery::BatteryEstimator;
pub use config::{BatteryConfig, CanConfig, DriveModeConfig, FusionConfig};
pub use decoder::{CanFrameDecoder, CanSignal};
pub use drive_mode::DriveModeArbiter;
pub use fusion::{Collaborators, TelemetryFusion};
pub use snapshot::{SnapshotError, SnapshotReader};
pub use sources::{
    BatterySource, CanSource, FrameQueue, GamepadSource, Source, ThrottleSource,
};
pub use types::{
    BatteryReading, BatterySample, ButtonState, CanFrame, CanSample, CellCount, DriveCommand,
    DriveMode, FusedTelemetryRecord, FusionError, Resolution, ResolutionSource, Result,
    SampleOrigin, Timestamp,
};

// Internal modules (not exposed in public API)
mod message_decoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
