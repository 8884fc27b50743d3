//! Configuration loading and command-line overrides

use anyhow::{Context, Result};
use cluster_fusion::{CellCount, FusionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from bridge.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Where the bridge finds its hardware
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// hwmon directory of the pack monitor (e.g. /sys/class/hwmon/hwmon2)
    pub hwmon_dir: Option<PathBuf>,
    /// candump log replayed as the CAN bus
    pub can_replay: Option<PathBuf>,
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
}

fn default_vehicle_type() -> String {
    "standard".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            hwmon_dir: None,
            can_replay: None,
            vehicle_type: default_vehicle_type(),
        }
    }
}

/// Values given on the command line; each one that is set wins over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub interval: Option<f64>,
    pub snapshot: Option<PathBuf>,
    pub no_snapshot: bool,
    pub can_replay: Option<PathBuf>,
    pub hwmon: Option<PathBuf>,
    pub cells: Option<u8>,
}

impl AppConfig {
    /// Apply command-line overrides and validate the result
    pub fn with_overrides(mut self, overrides: &Overrides) -> Result<Self> {
        if let Some(seconds) = overrides.interval {
            self.fusion = self.fusion.with_tick_interval(seconds);
        }
        if let Some(path) = &overrides.snapshot {
            self.fusion = self.fusion.with_snapshot_path(Some(path.clone()));
        }
        if overrides.no_snapshot {
            self.fusion = self.fusion.with_snapshot_path(None);
        }
        if let Some(path) = &overrides.can_replay {
            self.bridge.can_replay = Some(path.clone());
        }
        if let Some(path) = &overrides.hwmon {
            self.bridge.hwmon_dir = Some(path.clone());
        }
        if let Some(cells) = overrides.cells {
            let cells = CellCount::try_from(cells).context("Invalid --cells value")?;
            self.fusion = self.fusion.with_forced_cell_count(cells);
        }

        self.fusion
            .validate()
            .context("Invalid fusion configuration")?;

        Ok(self)
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
