//! Fusion engine configuration types
//!
//! Every tuning knob of the engine lives here, grouped by the component that
//! consumes it. All sections deserialize with defaults, so an empty TOML table
//! (or `FusionConfig::default()`) yields the reference behavior.

use crate::types::{secs_to_duration, CellCount, FusionError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where the external control process writes its drive-mode snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/piracer_drive_mode.json";

/// Top-level configuration for one fusion cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    #[serde(default)]
    pub battery: BatteryConfig,

    #[serde(default)]
    pub can: CanConfig,

    #[serde(default)]
    pub drive_mode: DriveModeConfig,

    /// Polling cadence of the host loop (default: 0.5s)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: f64,
}

fn default_tick_interval() -> f64 {
    0.5
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            battery: BatteryConfig::default(),
            can: CanConfig::default(),
            drive_mode: DriveModeConfig::default(),
            tick_interval_seconds: default_tick_interval(),
        }
    }
}

/// Battery estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// EMA smoothing factor in (0, 1] (default: 0.12)
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Assumed pack + wiring resistance for sag compensation (default: 0.10 ohm)
    #[serde(default = "default_internal_resistance")]
    pub internal_resistance_ohm: f64,

    #[serde(default = "default_true")]
    pub enable_sag_compensation: bool,

    /// Pin the cell count instead of classifying from pack voltage
    #[serde(default)]
    pub forced_cell_count: Option<CellCount>,

    /// Maximum upward movement of the displayed percent per tick (default: 0.8)
    #[serde(default = "default_rise_limit")]
    pub rise_limit_per_tick: f64,
}

fn default_alpha() -> f64 {
    0.12
}

fn default_internal_resistance() -> f64 {
    0.10
}

fn default_true() -> bool {
    true
}

fn default_rise_limit() -> f64 {
    0.8
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            internal_resistance_ohm: default_internal_resistance(),
            enable_sag_compensation: true,
            forced_cell_count: None,
            rise_limit_per_tick: default_rise_limit(),
        }
    }
}

/// CAN decoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanConfig {
    /// Arbitration ID of the speed frame; rpm uses this ID + 1 (default: 0x123)
    #[serde(default = "default_speed_can_id")]
    pub speed_can_id: u32,

    /// Frames drained per tick before returning (default: 10)
    #[serde(default = "default_max_frames")]
    pub max_frames_per_tick: usize,
}

fn default_speed_can_id() -> u32 {
    0x123
}

fn default_max_frames() -> usize {
    10
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            speed_can_id: default_speed_can_id(),
            max_frames_per_tick: default_max_frames(),
        }
    }
}

impl CanConfig {
    pub fn rpm_can_id(&self) -> u32 {
        self.speed_can_id.wrapping_add(1)
    }
}

/// Drive-mode arbitration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveModeConfig {
    /// Snapshot file to poll; `None` disables the snapshot source
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: Option<PathBuf>,

    /// Snapshots older than this are ignored (default: 2.0s)
    #[serde(default = "default_snapshot_max_age")]
    pub snapshot_max_age_seconds: f64,

    /// Throttle magnitude below which the fallback reports neutral (default: 0.05)
    #[serde(default = "default_throttle_dead_zone")]
    pub throttle_dead_zone: f64,

    /// CAN speed above which the vehicle counts as moving (default: 0.1 km/h)
    #[serde(default = "default_moving_speed")]
    pub moving_speed_threshold_kmh: f64,
}

fn default_snapshot_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH))
}

fn default_snapshot_max_age() -> f64 {
    2.0
}

fn default_throttle_dead_zone() -> f64 {
    0.05
}

fn default_moving_speed() -> f64 {
    0.1
}

impl Default for DriveModeConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            snapshot_max_age_seconds: default_snapshot_max_age(),
            throttle_dead_zone: default_throttle_dead_zone(),
            moving_speed_threshold_kmh: default_moving_speed(),
        }
    }
}

impl DriveModeConfig {
    pub fn snapshot_max_age(&self) -> Duration {
        secs_to_duration(self.snapshot_max_age_seconds)
    }
}

impl FusionConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the EMA smoothing factor
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.battery.alpha = alpha;
        self
    }

    /// Builder method: set the internal resistance used for sag compensation
    pub fn with_internal_resistance(mut self, ohms: f64) -> Self {
        self.battery.internal_resistance_ohm = ohms;
        self
    }

    /// Builder method: enable or disable sag compensation
    pub fn with_sag_compensation(mut self, enabled: bool) -> Self {
        self.battery.enable_sag_compensation = enabled;
        self
    }

    /// Builder method: pin the cell count
    pub fn with_forced_cell_count(mut self, cells: CellCount) -> Self {
        self.battery.forced_cell_count = Some(cells);
        self
    }

    /// Builder method: set the speed frame ID
    pub fn with_speed_can_id(mut self, can_id: u32) -> Self {
        self.can.speed_can_id = can_id;
        self
    }

    /// Builder method: set the per-tick CAN batch cap
    pub fn with_max_frames_per_tick(mut self, max_frames: usize) -> Self {
        self.can.max_frames_per_tick = max_frames;
        self
    }

    /// Builder method: set (or with `None`, disable) the snapshot file
    pub fn with_snapshot_path(mut self, path: Option<PathBuf>) -> Self {
        self.drive_mode.snapshot_path = path;
        self
    }

    /// Builder method: set the snapshot freshness window
    pub fn with_snapshot_max_age(mut self, seconds: f64) -> Self {
        self.drive_mode.snapshot_max_age_seconds = seconds;
        self
    }

    /// Builder method: set the polling cadence
    pub fn with_tick_interval(mut self, seconds: f64) -> Self {
        self.tick_interval_seconds = seconds;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        secs_to_duration(self.tick_interval_seconds)
    }

    /// Check every value is inside its meaningful range
    pub fn validate(&self) -> Result<()> {
        let battery = &self.battery;
        if !(battery.alpha > 0.0 && battery.alpha <= 1.0) {
            return Err(FusionError::InvalidConfig(format!(
                "alpha must be in (0, 1], got {}",
                battery.alpha
            )));
        }
        ensure_non_negative("internal_resistance_ohm", battery.internal_resistance_ohm)?;
        ensure_non_negative("rise_limit_per_tick", battery.rise_limit_per_tick)?;

        if self.can.max_frames_per_tick == 0 {
            return Err(FusionError::InvalidConfig(
                "max_frames_per_tick must be at least 1".to_string(),
            ));
        }

        let drive = &self.drive_mode;
        ensure_non_negative("snapshot_max_age_seconds", drive.snapshot_max_age_seconds)?;
        ensure_non_negative("throttle_dead_zone", drive.throttle_dead_zone)?;
        ensure_non_negative("moving_speed_threshold_kmh", drive.moving_speed_threshold_kmh)?;

        if !(self.tick_interval_seconds.is_finite() && self.tick_interval_seconds > 0.0) {
            return Err(FusionError::InvalidConfig(format!(
                "tick_interval_seconds must be positive, got {}",
                self.tick_interval_seconds
            )));
        }

        Ok(())
    }
}

fn ensure_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FusionError::InvalidConfig(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FusionConfig::new();
        assert_eq!(config.battery.alpha, 0.12);
        assert_eq!(config.battery.internal_resistance_ohm, 0.10);
        assert!(config.battery.enable_sag_compensation);
        assert_eq!(config.battery.forced_cell_count, None);
        assert_eq!(config.can.speed_can_id, 0x123);
        assert_eq!(config.can.rpm_can_id(), 0x124);
        assert_eq!(config.can.max_frames_per_tick, 10);
        assert_eq!(
            config.drive_mode.snapshot_path,
            Some(PathBuf::from(DEFAULT_SNAPSHOT_PATH))
        );
        assert_eq!(config.drive_mode.snapshot_max_age(), Duration::from_secs(2));
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = FusionConfig::new()
            .with_alpha(0.5)
            .with_internal_resistance(0.2)
            .with_sag_compensation(false)
            .with_forced_cell_count(CellCount::Three)
            .with_speed_can_id(0x200)
            .with_max_frames_per_tick(4)
            .with_snapshot_path(None)
            .with_snapshot_max_age(1.5)
            .with_tick_interval(0.1);

        assert_eq!(config.battery.alpha, 0.5);
        assert!(!config.battery.enable_sag_compensation);
        assert_eq!(config.battery.forced_cell_count, Some(CellCount::Three));
        assert_eq!(config.can.rpm_can_id(), 0x201);
        assert_eq!(config.can.max_frames_per_tick, 4);
        assert_eq!(config.drive_mode.snapshot_path, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(FusionConfig::new().with_alpha(0.0).validate().is_err());
        assert!(FusionConfig::new().with_alpha(1.5).validate().is_err());
        assert!(FusionConfig::new().with_alpha(1.0).validate().is_ok());
        assert!(FusionConfig::new()
            .with_internal_resistance(-0.1)
            .validate()
            .is_err());
        assert!(FusionConfig::new()
            .with_max_frames_per_tick(0)
            .validate()
            .is_err());
        assert!(FusionConfig::new().with_tick_interval(0.0).validate().is_err());
        assert!(FusionConfig::new()
            .with_snapshot_max_age(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: FusionConfig = serde_json::from_str(
            r#"{ "battery": { "alpha": 0.3, "forced_cell_count": 3 }, "can": { "speed_can_id": 256 } }"#,
        )
        .unwrap();

        assert_eq!(config.battery.alpha, 0.3);
        assert_eq!(config.battery.internal_resistance_ohm, 0.10);
        assert_eq!(config.battery.forced_cell_count, Some(CellCount::Three));
        assert_eq!(config.can.speed_can_id, 256);
        assert_eq!(config.can.max_frames_per_tick, 10);
        assert_eq!(config.tick_interval_seconds, 0.5);
    }

    #[test]
    fn test_deserialize_rejects_bad_cell_count() {
        let result: std::result::Result<FusionConfig, _> =
            serde_json::from_str(r#"{ "battery": { "forced_cell_count": 6 } }"#);
        assert!(result.is_err());
    }
}
