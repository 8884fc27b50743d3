//! Drive-mode arbitration
//!
//! Resolves one direction per tick from inputs of falling priority:
//!
//! 1. A fresh snapshot from the external control process
//! 2. Gamepad button edges (X drive, B reverse, Y neutral, A brake)
//! 3. Without a gamepad: throttle dead-zone, overridden to drive while the CAN
//!    speed says the vehicle is moving
//!
//! A resolved snapshot skips the gamepad entirely for that tick. The fallback
//! result is reported but not latched as the held mode.

use crate::config::DriveModeConfig;
use crate::snapshot::{SnapshotError, SnapshotReader};
use crate::sources::{GamepadSource, Source};
use crate::types::{ButtonState, CanSample, DriveCommand, DriveMode, Resolution, ResolutionSource};
use std::time::SystemTime;

/// Drive-mode state machine
#[derive(Debug, Clone)]
pub struct DriveModeArbiter {
    config: DriveModeConfig,
    snapshot: Option<SnapshotReader>,
    mode: DriveMode,
    last_command: Option<DriveCommand>,
    prev_buttons: ButtonState,
    throttle: f64,
}

impl DriveModeArbiter {
    pub fn new(config: DriveModeConfig) -> Self {
        let snapshot = config
            .snapshot_path
            .as_ref()
            .map(|path| SnapshotReader::new(path.clone(), config.snapshot_max_age()));

        Self {
            config,
            snapshot,
            mode: DriveMode::Neutral,
            last_command: None,
            prev_buttons: ButtonState::default(),
            throttle: 0.0,
        }
    }

    /// Currently held mode
    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Input that last changed the held mode
    pub fn last_command(&self) -> Option<DriveCommand> {
        self.last_command
    }

    pub fn previous_buttons(&self) -> ButtonState {
        self.prev_buttons
    }

    pub fn throttle(&self) -> f64 {
        self.throttle
    }

    /// Record the latest throttle position used by the fallback path
    pub fn set_throttle(&mut self, throttle: f64) {
        if throttle.is_finite() {
            self.throttle = throttle;
        }
    }

    /// Apply a command to the held mode
    pub fn apply(&mut self, command: DriveCommand) {
        let mode = command.mode();
        if mode != self.mode {
            log::debug!("Drive mode {} -> {} ({:?})", self.mode, mode, command);
        }
        self.mode = mode;
        self.last_command = Some(command);
    }

    /// Try the snapshot source; true if it set the mode
    pub fn resolve_snapshot(&mut self, now: SystemTime) -> bool {
        let Some(reader) = &self.snapshot else {
            return false;
        };

        match reader.read_mode(now) {
            Ok(mode) => {
                self.apply(DriveCommand::from(mode));
                true
            }
            Err(SnapshotError::Unreadable(e)) => {
                log::trace!("No snapshot at {:?}: {}", reader.path(), e);
                false
            }
            Err(e) => {
                log::debug!("Ignoring snapshot {:?}: {}", reader.path(), e);
                false
            }
        }
    }

    /// Apply rising edges in `buttons`; true if any edge fired
    ///
    /// Edges apply in the order X, B, Y, A so A wins when co-pressed.
    pub fn apply_buttons(&mut self, buttons: ButtonState) -> bool {
        let prev = self.prev_buttons;
        let edges = [
            (buttons.x && !prev.x, DriveCommand::Drive),
            (buttons.b && !prev.b, DriveCommand::Reverse),
            (buttons.y && !prev.y, DriveCommand::Neutral),
            (buttons.a && !prev.a, DriveCommand::Brake),
        ];

        let mut fired = false;
        for (rising, command) in edges {
            if rising {
                self.apply(command);
                fired = true;
            }
        }

        self.prev_buttons = buttons;
        fired
    }

    /// Read the gamepad once and apply any edges
    pub fn poll_gamepad<G>(&mut self, gamepad: &mut G) -> bool
    where
        G: GamepadSource + ?Sized,
    {
        match gamepad.poll_buttons() {
            Ok(Some(buttons)) => self.apply_buttons(buttons),
            Ok(None) => false,
            Err(e) => {
                log::warn!("Gamepad read failed: {}", e);
                false
            }
        }
    }

    /// Direction derived from throttle and CAN speed
    pub fn fallback_mode(&self, speed_kmh: Option<f64>) -> DriveMode {
        let dead_zone = self.config.throttle_dead_zone;
        let from_throttle = if self.throttle > dead_zone {
            DriveMode::Drive
        } else if self.throttle < -dead_zone {
            DriveMode::Reverse
        } else {
            DriveMode::Neutral
        };

        let moving = speed_kmh
            .map(|kmh| kmh.abs() > self.config.moving_speed_threshold_kmh)
            .unwrap_or(false);

        if from_throttle == DriveMode::Neutral && moving {
            DriveMode::Drive
        } else {
            from_throttle
        }
    }

    /// Run one arbitration step
    ///
    /// `can` is this tick's decoded sample; only a speed decoded this tick can
    /// trigger the moving override.
    pub fn resolve<G>(
        &mut self,
        now: SystemTime,
        gamepad: Source<&mut G>,
        can: &CanSample,
    ) -> Resolution
    where
        G: GamepadSource + ?Sized,
    {
        if self.resolve_snapshot(now) {
            return Resolution {
                mode: self.mode,
                source: ResolutionSource::Snapshot,
            };
        }

        match gamepad {
            Source::Available(pad) => {
                let source = if self.poll_gamepad(pad) {
                    ResolutionSource::Gamepad
                } else {
                    ResolutionSource::Held
                };
                Resolution {
                    mode: self.mode,
                    source,
                }
            }
            Source::Unavailable => Resolution {
                mode: self.fallback_mode(can.speed_kmh),
                source: ResolutionSource::Fallback,
            },
        }
    }
}

impl Default for DriveModeArbiter {
    fn default() -> Self {
        Self::new(DriveModeConfig::default())
    }
}
