//! Telemetry fusion cycle
//!
//! [`TelemetryFusion`] owns every piece of per-session state (battery filter,
//! CAN last-known values, arbiter mode and button memory) together with the
//! collaborators, and turns one call to [`TelemetryFusion::tick`] into one
//! [`FusedTelemetryRecord`]. A tick never fails: unavailable or failing inputs
//! degrade to defaults.

use crate::battery::{percent_for_pack, BatteryEstimator};
use crate::config::FusionConfig;
use crate::decoder::CanFrameDecoder;
use crate::drive_mode::DriveModeArbiter;
use crate::sources::{BatterySource, CanSource, GamepadSource, Source, ThrottleSource};
use crate::types::{
    timestamp_to_secs, BatteryReading, BatterySample, CanSample, FusedTelemetryRecord, Result,
    SampleOrigin, Timestamp,
};
use chrono::Utc;
use std::time::SystemTime;

/// The external inputs of a fusion cycle
///
/// Anything left unset is `Unavailable`.
#[derive(Default)]
pub struct Collaborators {
    pub battery: Source<Box<dyn BatterySource>>,
    pub can: Source<Box<dyn CanSource>>,
    pub gamepad: Source<Box<dyn GamepadSource>>,
    pub throttle: Source<Box<dyn ThrottleSource>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_battery(mut self, source: impl BatterySource + 'static) -> Self {
        self.battery = Source::Available(Box::new(source));
        self
    }

    pub fn with_can(mut self, source: impl CanSource + 'static) -> Self {
        self.can = Source::Available(Box::new(source));
        self
    }

    pub fn with_gamepad(mut self, source: impl GamepadSource + 'static) -> Self {
        self.gamepad = Source::Available(Box::new(source));
        self
    }

    pub fn with_throttle(mut self, source: impl ThrottleSource + 'static) -> Self {
        self.throttle = Source::Available(Box::new(source));
        self
    }

    /// Short description of which inputs are wired, for startup logging
    pub fn describe(&self) -> String {
        let flag = |available: bool| if available { "yes" } else { "no" };
        format!(
            "battery={} can={} gamepad={} throttle={}",
            flag(self.battery.is_available()),
            flag(self.can.is_available()),
            flag(self.gamepad.is_available()),
            flag(self.throttle.is_available()),
        )
    }
}

/// One fusion engine instance, driven by a single sequential loop
pub struct TelemetryFusion {
    config: FusionConfig,
    estimator: BatteryEstimator,
    can_decoder: CanFrameDecoder,
    arbiter: DriveModeArbiter,
    collaborators: Collaborators,
}

impl TelemetryFusion {
    /// Validate the configuration and build the engine
    pub fn new(config: FusionConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        log::info!(
            "Fusion engine ready: speed ID 0x{:X}, batch {}, snapshot {:?}, {}",
            config.can.speed_can_id,
            config.can.max_frames_per_tick,
            config.drive_mode.snapshot_path,
            collaborators.describe()
        );

        Ok(Self {
            estimator: BatteryEstimator::new(config.battery.clone()),
            can_decoder: CanFrameDecoder::new(&config.can),
            arbiter: DriveModeArbiter::new(config.drive_mode.clone()),
            collaborators,
            config,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn estimator(&self) -> &BatteryEstimator {
        &self.estimator
    }

    pub fn can_decoder(&self) -> &CanFrameDecoder {
        &self.can_decoder
    }

    pub fn arbiter(&self) -> &DriveModeArbiter {
        &self.arbiter
    }

    /// Run one tick stamped with the current wall-clock time
    pub fn tick(&mut self) -> FusedTelemetryRecord {
        self.tick_at(Utc::now())
    }

    /// Run one tick as of `now`
    pub fn tick_at(&mut self, now: Timestamp) -> FusedTelemetryRecord {
        let can = self.drain_can();
        self.refresh_throttle();

        let resolution = self.arbiter.resolve(
            SystemTime::from(now),
            self.collaborators.gamepad.as_mut(),
            &can,
        );
        log::trace!("Direction {} via {:?}", resolution.mode, resolution.source);

        let (sample, origin) = self.read_battery(now);
        let percent = match origin {
            SampleOrigin::Measured => self.estimator.update(sample.pack_voltage, sample.current_ma),
            // Synthetic values must not leak into the smoothing state
            SampleOrigin::Synthetic => {
                percent_for_pack(sample.pack_voltage, self.config.battery.forced_cell_count)
            }
        };

        FusedTelemetryRecord {
            battery: BatteryReading {
                voltage: round_to(sample.pack_voltage, 2),
                percent: round_to(percent, 1),
                current: round_to(sample.current_ma, 1),
                power: round_to(sample.power(), 2),
            },
            direction: resolution.mode,
            timestamp: now,
            speed_kmh: can.speed_kmh.map(|kmh| round_to(kmh, 2)),
            rpm: can.rpm.map(|rpm| round_to(rpm, 1)),
            origin,
        }
    }

    fn drain_can(&mut self) -> CanSample {
        match self.collaborators.can.as_mut() {
            Source::Available(bus) => self.can_decoder.drain(bus),
            Source::Unavailable => CanSample::default(),
        }
    }

    fn refresh_throttle(&mut self) {
        let Source::Available(source) = self.collaborators.throttle.as_mut() else {
            return;
        };
        match source.read_throttle() {
            Ok(Some(throttle)) => self.arbiter.set_throttle(throttle),
            Ok(None) => {}
            Err(e) => log::warn!("Throttle read failed: {}", e),
        }
    }

    fn read_battery(&mut self, now: Timestamp) -> (BatterySample, SampleOrigin) {
        match self.collaborators.battery.as_mut() {
            Source::Available(monitor) => match monitor.read_sample() {
                Ok(sample) => (sample, SampleOrigin::Measured),
                Err(e) => {
                    log::warn!("Battery read failed, using synthetic sample: {}", e);
                    (synthetic_sample(now), SampleOrigin::Synthetic)
                }
            },
            Source::Unavailable => (synthetic_sample(now), SampleOrigin::Synthetic),
        }
    }
}

/// Deterministic stand-in reading for when no battery monitor is available
///
/// Sweeps 7.8..8.0V over 10s and 150..200mA over 5s.
pub fn synthetic_sample(now: Timestamp) -> BatterySample {
    let t = timestamp_to_secs(&now);
    let voltage = 7.8 + 0.2 * (t % 10.0) / 10.0;
    let current_ma = 150.0 + 50.0 * (t % 5.0) / 5.0;
    BatterySample::new(voltage, current_ma).with_power(voltage * 0.15)
}

/// Round to a fixed number of decimal places for display
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
