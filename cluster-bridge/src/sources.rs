//! Concrete collaborators for the bridge
//!
//! - [`HwmonBatterySource`] reads an INA219-style pack monitor through sysfs
//! - [`load_replay`] turns a recorded CAN log into a [`FrameQueue`]

use anyhow::{Context, Result};
use cluster_fusion::formats::LogFileParser;
use cluster_fusion::{BatterySample, BatterySource, FrameQueue, FusionError};
use std::fs;
use std::path::{Path, PathBuf};

/// Bus voltage in mV
const VOLTAGE_FILE: &str = "in1_input";
/// Current in mA
const CURRENT_FILE: &str = "curr1_input";
/// Power in uW (optional)
const POWER_FILE: &str = "power1_input";

/// Battery monitor exposed as a Linux hwmon device
#[derive(Debug, Clone)]
pub struct HwmonBatterySource {
    dir: PathBuf,
}

impl HwmonBatterySource {
    /// Use `dir` if it exposes the voltage and current attributes
    pub fn open(dir: &Path) -> Option<Self> {
        let present = [VOLTAGE_FILE, CURRENT_FILE]
            .iter()
            .all(|name| dir.join(name).is_file());

        if present {
            log::info!("Battery monitor at {:?}", dir);
            Some(Self {
                dir: dir.to_path_buf(),
            })
        } else {
            log::warn!("No hwmon battery attributes in {:?}; using synthetic samples", dir);
            None
        }
    }

    fn read_attr(&self, name: &str) -> cluster_fusion::Result<f64> {
        let raw = fs::read_to_string(self.dir.join(name))?;
        raw.trim()
            .parse::<i64>()
            .map(|value| value as f64)
            .map_err(|e| FusionError::source_failed("hwmon", format!("{}: {}", name, e)))
    }
}

impl BatterySource for HwmonBatterySource {
    fn read_sample(&mut self) -> cluster_fusion::Result<BatterySample> {
        let pack_voltage = self.read_attr(VOLTAGE_FILE)? / 1000.0;
        let current_ma = self.read_attr(CURRENT_FILE)?;
        let sample = BatterySample::new(pack_voltage, current_ma);

        match self.read_attr(POWER_FILE) {
            Ok(power_uw) => Ok(sample.with_power(power_uw / 1_000_000.0)),
            Err(_) => Ok(sample),
        }
    }
}

/// Read a whole CAN log into a replay queue
///
/// Lines that fail to parse are skipped with a warning.
pub fn load_replay<P: LogFileParser>(path: &Path) -> Result<FrameQueue> {
    let frames = P::parse(path).with_context(|| format!("Failed to open CAN replay: {:?}", path))?;

    let mut queue = FrameQueue::new();
    let mut skipped = 0usize;
    for frame in frames {
        match frame {
            Ok(frame) => queue.push(frame),
            Err(e) => {
                log::warn!("Skipping replay entry: {}", e);
                skipped += 1;
            }
        }
    }

    log::info!(
        "Loaded {} CAN frames from {:?} ({} skipped)",
        queue.len(),
        path,
        skipped
    );
    Ok(queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_fusion::formats::CandumpFrameIterator;
    use cluster_fusion::CanSource;
    use std::io::Write;

    fn hwmon_dir(voltage_mv: &str, current_ma: &str, power_uw: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VOLTAGE_FILE), voltage_mv).unwrap();
        fs::write(dir.path().join(CURRENT_FILE), current_ma).unwrap();
        if let Some(power) = power_uw {
            fs::write(dir.path().join(POWER_FILE), power).unwrap();
        }
        dir
    }

    #[test]
    fn test_hwmon_reading() {
        let dir = hwmon_dir("8016\n", "204\n", Some("1635000\n"));
        let mut source = HwmonBatterySource::open(dir.path()).unwrap();

        let sample = source.read_sample().unwrap();
        assert!((sample.pack_voltage - 8.016).abs() < 1e-9);
        assert_eq!(sample.current_ma, 204.0);
        assert_eq!(sample.power_w, Some(1.635));
    }

    #[test]
    fn test_hwmon_without_power() {
        let dir = hwmon_dir("8000", "-150", None);
        let mut source = HwmonBatterySource::open(dir.path()).unwrap();

        let sample = source.read_sample().unwrap();
        assert_eq!(sample.current_ma, -150.0);
        assert_eq!(sample.power_w, None);
        assert!((sample.power() + 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_hwmon_missing_or_garbled() {
        let empty = tempfile::tempdir().unwrap();
        assert!(HwmonBatterySource::open(empty.path()).is_none());

        let dir = hwmon_dir("8000", "n/a", None);
        let mut source = HwmonBatterySource::open(dir.path()).unwrap();
        assert!(source.read_sample().is_err());
    }

    #[test]
    fn test_load_replay_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(1700000000.000000) can0 123#1100000000000000").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "(1700000000.005000) can0 123#a\u{e9}1").unwrap();
        writeln!(file, "(1700000000.010000) can0 124#0080BB44").unwrap();
        file.flush().unwrap();

        let mut queue = load_replay::<CandumpFrameIterator>(file.path()).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_recv().unwrap().unwrap().can_id, 0x123);
    }

    #[test]
    fn test_load_replay_missing_file() {
        assert!(load_replay::<CandumpFrameIterator>(Path::new("/nonexistent/trace.log")).is_err());
    }
}
