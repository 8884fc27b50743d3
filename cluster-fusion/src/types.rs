//! Core types for the cluster telemetry fusion engine
//!
//! This module defines the values that flow through one fusion tick: raw inputs
//! from the collaborators (battery samples, CAN frames, button states), the
//! intermediate results (CAN samples, drive-mode resolutions) and the fused record
//! handed to the display process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Timestamp type used throughout the engine
pub type Timestamp = DateTime<Utc>;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, FusionError>;

/// Raw CAN frame as delivered by a bus transport or a replayed log
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Arbitration ID (11-bit or 29-bit)
    pub can_id: u32,
    /// Frame data bytes (0-8 bytes for classic CAN, up to 64 for CAN-FD)
    pub data: Vec<u8>,
    /// Capture time in nanoseconds since epoch, when the source knows it
    pub timestamp_ns: Option<u64>,
    /// Interface name (e.g. "can0"), when the source knows it
    pub channel: Option<String>,
}

impl CanFrame {
    /// Create a frame with only an ID and payload
    pub fn new(can_id: u32, data: Vec<u8>) -> Self {
        Self {
            can_id,
            data,
            timestamp_ns: None,
            channel: None,
        }
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    /// Convert the capture time to a `Timestamp`, if one was recorded
    pub fn timestamp(&self) -> Option<Timestamp> {
        let ns = self.timestamp_ns?;
        let secs = (ns / 1_000_000_000) as i64;
        let nsecs = (ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs)
    }
}

/// Errors surfaced by the engine
///
/// Only configuration problems are returned to callers of the fusion cycle;
/// everything else is absorbed at the component boundary and logged.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported cell count: {0} (expected 2, 3 or 4)")]
    UnsupportedCellCount(u8),

    #[error("Source read failed ({source_name}): {message}")]
    Source {
        source_name: &'static str,
        message: String,
    },

    #[error("Failed to parse candump line {line}: {reason}")]
    CandumpParse { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FusionError {
    /// Shorthand for a collaborator read failure
    pub fn source_failed(source_name: &'static str, message: impl Into<String>) -> Self {
        FusionError::Source {
            source_name,
            message: message.into(),
        }
    }
}

/// Number of series cells in the pack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CellCount {
    Two,
    Three,
    Four,
}

impl CellCount {
    pub fn get(self) -> u8 {
        match self {
            CellCount::Two => 2,
            CellCount::Three => 3,
            CellCount::Four => 4,
        }
    }
}

impl TryFrom<u8> for CellCount {
    type Error = FusionError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(CellCount::Two),
            3 => Ok(CellCount::Three),
            4 => Ok(CellCount::Four),
            other => Err(FusionError::UnsupportedCellCount(other)),
        }
    }
}

impl From<CellCount> for u8 {
    fn from(cells: CellCount) -> u8 {
        cells.get()
    }
}

impl fmt::Display for CellCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}S", self.get())
    }
}

/// One reading from the battery monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    /// Pack voltage in V
    pub pack_voltage: f64,
    /// Battery current in mA (positive when discharging)
    pub current_ma: f64,
    /// Power draw in W, if the monitor reports it
    pub power_w: Option<f64>,
}

impl BatterySample {
    pub fn new(pack_voltage: f64, current_ma: f64) -> Self {
        Self {
            pack_voltage,
            current_ma,
            power_w: None,
        }
    }

    pub fn with_power(mut self, power_w: f64) -> Self {
        self.power_w = Some(power_w);
        self
    }

    /// Reported power, or V * I when the monitor does not provide it
    pub fn power(&self) -> f64 {
        self.power_w
            .unwrap_or(self.pack_voltage * self.current_ma / 1000.0)
    }
}

/// Values decoded from one CAN batch
///
/// A field is `Some` only if a frame of that kind was decoded during this batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CanSample {
    pub speed_kmh: Option<f64>,
    pub rpm: Option<f64>,
}

impl CanSample {
    pub fn is_empty(&self) -> bool {
        self.speed_kmh.is_none() && self.rpm.is_none()
    }
}

/// Resolved drive direction, as shown on the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveMode {
    #[default]
    #[serde(rename = "N")]
    Neutral,
    #[serde(rename = "F")]
    Drive,
    #[serde(rename = "R")]
    Reverse,
}

impl DriveMode {
    /// Wire symbol sent to the display
    pub fn symbol(self) -> &'static str {
        match self {
            DriveMode::Neutral => "N",
            DriveMode::Drive => "F",
            DriveMode::Reverse => "R",
        }
    }

    /// Parse a wire symbol; surrounding whitespace and case are ignored
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().to_ascii_uppercase().as_str() {
            "F" => Some(DriveMode::Drive),
            "R" => Some(DriveMode::Reverse),
            "N" => Some(DriveMode::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for DriveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Input cause that changed the drive mode
///
/// `Brake` and `Neutral` are distinct causes that resolve to the same mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveCommand {
    Drive,
    Reverse,
    Neutral,
    Brake,
}

impl DriveCommand {
    pub fn mode(self) -> DriveMode {
        match self {
            DriveCommand::Drive => DriveMode::Drive,
            DriveCommand::Reverse => DriveMode::Reverse,
            DriveCommand::Neutral | DriveCommand::Brake => DriveMode::Neutral,
        }
    }
}

impl From<DriveMode> for DriveCommand {
    fn from(mode: DriveMode) -> Self {
        match mode {
            DriveMode::Drive => DriveCommand::Drive,
            DriveMode::Reverse => DriveCommand::Reverse,
            DriveMode::Neutral => DriveCommand::Neutral,
        }
    }
}

/// Gamepad face buttons used for drive selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub x: bool,
    pub a: bool,
    pub b: bool,
    pub y: bool,
}

/// Which input decided the direction for a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Fresh snapshot from the external control process
    Snapshot,
    /// A gamepad button edge changed the mode this tick
    Gamepad,
    /// No new input; the previously held mode stands
    Held,
    /// No gamepad device; derived from throttle and CAN speed
    Fallback,
}

/// Outcome of one arbitration step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub mode: DriveMode,
    pub source: ResolutionSource,
}

/// Whether the battery values came from the monitor or were synthesized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleOrigin {
    #[default]
    Measured,
    Synthetic,
}

/// Battery block of the fused record (display-rounded)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryReading {
    pub voltage: f64,
    pub percent: f64,
    pub current: f64,
    pub power: f64,
}

/// Record emitted to the display once per tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedTelemetryRecord {
    pub battery: BatteryReading,
    pub direction: DriveMode,
    #[serde(serialize_with = "serialize_timestamp_secs")]
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm: Option<f64>,
    #[serde(skip)]
    pub origin: SampleOrigin,
}

/// Seconds since the Unix epoch with sub-second precision
pub fn timestamp_to_secs(ts: &Timestamp) -> f64 {
    ts.timestamp() as f64 + (ts.timestamp_subsec_nanos() as f64 / 1_000_000_000.0)
}

fn serialize_timestamp_secs<S>(ts: &Timestamp, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(timestamp_to_secs(ts))
}

/// Convert seconds (as found in config files) into a `Duration`, clamping
/// negative and non-finite values to zero
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
