//! CAN frame decoder
//!
//! Drains a bounded batch of frames from a non-blocking source each tick and
//! turns the speed / rpm frames into values. Last-known values are kept across
//! ticks; the per-batch [`CanSample`] only reports what was decoded this time.

use crate::config::CanConfig;
use crate::message_decoder::PayloadDecoder;
use crate::sources::CanSource;
use crate::types::{CanFrame, CanSample};

/// A value decoded from a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanSignal {
    SpeedKmh(f64),
    Rpm(f64),
}

/// Stateful decoder for the speed (ID) and rpm (ID + 1) frames
#[derive(Debug, Clone)]
pub struct CanFrameDecoder {
    speed_can_id: u32,
    rpm_can_id: u32,
    max_frames_per_tick: usize,
    last_speed_kmh: Option<f64>,
    last_rpm: Option<f64>,
}

impl CanFrameDecoder {
    pub fn new(config: &CanConfig) -> Self {
        Self {
            speed_can_id: config.speed_can_id,
            rpm_can_id: config.rpm_can_id(),
            max_frames_per_tick: config.max_frames_per_tick,
            last_speed_kmh: None,
            last_rpm: None,
        }
    }

    /// Most recent speed ever decoded
    pub fn last_speed_kmh(&self) -> Option<f64> {
        self.last_speed_kmh
    }

    /// Most recent rpm ever decoded
    pub fn last_rpm(&self) -> Option<f64> {
        self.last_rpm
    }

    /// Decode one frame, updating the last-known values
    ///
    /// Returns `None` for unrelated IDs, short payloads and malformed floats.
    pub fn decode_frame(&mut self, frame: &CanFrame) -> Option<CanSignal> {
        let signal = if frame.can_id == self.speed_can_id {
            PayloadDecoder::decode_speed(&frame.data).map(CanSignal::SpeedKmh)
        } else if frame.can_id == self.rpm_can_id {
            PayloadDecoder::decode_rpm(&frame.data).map(CanSignal::Rpm)
        } else {
            log::trace!("Ignoring CAN ID 0x{:X}", frame.can_id);
            return None;
        };

        match signal {
            Some(CanSignal::SpeedKmh(kmh)) => {
                log::debug!("CAN speed: {:.2} km/h (ID 0x{:X})", kmh, frame.can_id);
                self.last_speed_kmh = Some(kmh);
            }
            Some(CanSignal::Rpm(rpm)) => {
                log::debug!("CAN rpm: {:.1} (ID 0x{:X})", rpm, frame.can_id);
                self.last_rpm = Some(rpm);
            }
            None => {
                log::trace!(
                    "Discarding frame 0x{:X} with {} byte payload",
                    frame.can_id,
                    frame.dlc()
                );
            }
        }

        signal
    }

    /// Decode up to `max_frames_per_tick` frames from an iterator
    pub fn decode_frames<'a, I>(&mut self, frames: I) -> CanSample
    where
        I: IntoIterator<Item = &'a CanFrame>,
    {
        let mut sample = CanSample::default();
        for frame in frames.into_iter().take(self.max_frames_per_tick) {
            Self::record(&mut sample, self.decode_frame(frame));
        }
        sample
    }

    /// Drain pending frames from a source without blocking
    ///
    /// Stops after `max_frames_per_tick` frames, when the source has nothing
    /// pending, or when it reports an error.
    pub fn drain<S>(&mut self, source: &mut S) -> CanSample
    where
        S: CanSource + ?Sized,
    {
        let mut sample = CanSample::default();

        for _ in 0..self.max_frames_per_tick {
            let frame = match source.try_recv() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("CAN receive failed, ending batch: {}", e);
                    break;
                }
            };
            Self::record(&mut sample, self.decode_frame(&frame));
        }

        sample
    }

    fn record(sample: &mut CanSample, signal: Option<CanSignal>) {
        match signal {
            Some(CanSignal::SpeedKmh(kmh)) => sample.speed_kmh = Some(kmh),
            Some(CanSignal::Rpm(rpm)) => sample.rpm = Some(rpm),
            None => {}
        }
    }
}

impl Default for CanFrameDecoder {
    fn default() -> Self {
        Self::new(&CanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::FrameQueue;
    use crate::types::{FusionError, Result};

    fn speed_frame(data: Vec<u8>) -> CanFrame {
        CanFrame::new(0x123, data)
    }

    fn rpm_frame(rpm: f32) -> CanFrame {
        CanFrame::new(0x124, rpm.to_le_bytes().to_vec())
    }

    #[test]
    fn test_integer_speed_path() {
        let mut decoder = CanFrameDecoder::default();
        let signal = decoder.decode_frame(&speed_frame(vec![17, 0, 0, 0, 0, 0, 0, 0]));
        assert_eq!(signal, Some(CanSignal::SpeedKmh(17.0)));
        assert_eq!(decoder.last_speed_kmh(), Some(17.0));
    }

    #[test]
    fn test_float_speed_and_rpm() {
        let mut decoder = CanFrameDecoder::default();
        let sample = decoder.decode_frames(&[
            speed_frame(42.25f32.to_le_bytes().to_vec()),
            rpm_frame(1500.0),
        ]);
        assert_eq!(sample.speed_kmh, Some(42.25));
        assert_eq!(sample.rpm, Some(1500.0));
    }

    #[test]
    fn test_other_ids_and_short_frames_ignored() {
        let mut decoder = CanFrameDecoder::default();
        let sample = decoder.decode_frames(&[
            CanFrame::new(0x100, vec![17, 0, 0, 0]),
            speed_frame(vec![17, 0, 0]),
            CanFrame::new(0x124, vec![1, 2]),
        ]);
        assert!(sample.is_empty());
        assert_eq!(decoder.last_speed_kmh(), None);
        assert_eq!(decoder.last_rpm(), None);
    }

    #[test]
    fn test_malformed_payload_keeps_last_value() {
        let mut decoder = CanFrameDecoder::default();
        decoder.decode_frame(&speed_frame(vec![30, 0, 0, 0]));
        let sample = decoder.decode_frames(&[speed_frame(f32::NAN.to_le_bytes().to_vec())]);
        assert_eq!(sample.speed_kmh, None);
        assert_eq!(decoder.last_speed_kmh(), Some(30.0));
    }

    #[test]
    fn test_latest_frame_in_batch_wins() {
        let mut decoder = CanFrameDecoder::default();
        let mut queue: FrameQueue = [
            speed_frame(vec![10, 0, 0, 0]),
            speed_frame(vec![11, 0, 0, 0]),
            speed_frame(vec![12, 0, 0, 0]),
        ]
        .into_iter()
        .collect();

        let sample = decoder.drain(&mut queue);
        assert_eq!(sample.speed_kmh, Some(12.0));
        assert_eq!(sample.rpm, None);
    }

    #[test]
    fn test_batch_is_capped() {
        let config = CanConfig {
            max_frames_per_tick: 3,
            ..CanConfig::default()
        };
        let mut decoder = CanFrameDecoder::new(&config);
        let mut queue: FrameQueue = (1..=5u8).map(|n| speed_frame(vec![n, 0, 0, 0])).collect();

        assert_eq!(decoder.drain(&mut queue).speed_kmh, Some(3.0));
        assert_eq!(queue.len(), 2);
        assert_eq!(decoder.drain(&mut queue).speed_kmh, Some(5.0));
        assert!(decoder.drain(&mut queue).is_empty());
        // Empty tick omits the field but the decoder still remembers it
        assert_eq!(decoder.last_speed_kmh(), Some(5.0));
    }

    #[test]
    fn test_default_cap_is_ten() {
        let mut decoder = CanFrameDecoder::default();
        let mut queue: FrameQueue = (1..=15u8).map(|n| speed_frame(vec![n, 0, 0, 0])).collect();
        assert_eq!(decoder.drain(&mut queue).speed_kmh, Some(10.0));
        assert_eq!(queue.len(), 5);
    }

    struct FailingBus {
        frames_before_error: usize,
    }

    impl CanSource for FailingBus {
        fn try_recv(&mut self) -> Result<Option<CanFrame>> {
            if self.frames_before_error == 0 {
                return Err(FusionError::source_failed("can", "bus off"));
            }
            self.frames_before_error -= 1;
            Ok(Some(CanFrame::new(0x124, 900.0f32.to_le_bytes().to_vec())))
        }
    }

    #[test]
    fn test_source_error_ends_batch() {
        let mut decoder = CanFrameDecoder::default();
        let mut bus = FailingBus {
            frames_before_error: 1,
        };
        let sample = decoder.drain(&mut bus);
        assert_eq!(sample.rpm, Some(900.0));

        let sample = decoder.drain(&mut bus);
        assert!(sample.is_empty());
        assert_eq!(decoder.last_rpm(), Some(900.0));
    }

    #[test]
    fn test_custom_speed_id() {
        let config = CanConfig {
            speed_can_id: 0x200,
            ..CanConfig::default()
        };
        let mut decoder = CanFrameDecoder::new(&config);
        assert!(decoder.decode_frame(&speed_frame(vec![5, 0, 0, 0])).is_none());
        assert_eq!(
            decoder.decode_frame(&CanFrame::new(0x200, vec![5, 0, 0, 0])),
            Some(CanSignal::SpeedKmh(5.0))
        );
        assert_eq!(
            decoder.decode_frame(&CanFrame::new(0x201, 60.0f32.to_le_bytes().to_vec())),
            Some(CanSignal::Rpm(60.0))
        );
    }
}
