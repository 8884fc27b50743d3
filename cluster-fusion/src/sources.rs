//! Collaborator interfaces
//!
//! The engine never talks to hardware directly. Each input arrives through a
//! trait object held in a [`Source`], which is either `Available` or
//! `Unavailable`; every call site handles both.
//!
//! Non-blocking reads return `Ok(None)` when nothing is pending. Errors are
//! reported to the caller, which logs them and skips that input for the tick.

use crate::types::{BatterySample, ButtonState, CanFrame, Result};
use std::collections::VecDeque;

/// An optional collaborator
#[derive(Debug)]
pub enum Source<T> {
    Available(T),
    Unavailable,
}

impl<T> Default for Source<T> {
    fn default() -> Self {
        Source::Unavailable
    }
}

impl<T> Source<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Source::Available(_))
    }

    pub fn as_mut(&mut self) -> Source<&mut T> {
        match self {
            Source::Available(inner) => Source::Available(inner),
            Source::Unavailable => Source::Unavailable,
        }
    }

    pub fn as_ref(&self) -> Source<&T> {
        match self {
            Source::Available(inner) => Source::Available(inner),
            Source::Unavailable => Source::Unavailable,
        }
    }
}

impl<T> From<Option<T>> for Source<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => Source::Available(inner),
            None => Source::Unavailable,
        }
    }
}

/// Battery monitor (pack voltage, current, optionally power)
pub trait BatterySource {
    fn read_sample(&mut self) -> Result<BatterySample>;
}

/// CAN bus receiver
pub trait CanSource {
    /// Return the next pending frame without blocking
    fn try_recv(&mut self) -> Result<Option<CanFrame>>;
}

/// Gamepad button reader
pub trait GamepadSource {
    /// Return the current button state, or `None` if no new input is available
    fn poll_buttons(&mut self) -> Result<Option<ButtonState>>;
}

/// Live throttle position in [-1, 1] (positive is forward)
pub trait ThrottleSource {
    fn read_throttle(&mut self) -> Result<Option<f64>>;
}

impl<T: BatterySource + ?Sized> BatterySource for Box<T> {
    fn read_sample(&mut self) -> Result<BatterySample> {
        (**self).read_sample()
    }
}

impl<T: CanSource + ?Sized> CanSource for Box<T> {
    fn try_recv(&mut self) -> Result<Option<CanFrame>> {
        (**self).try_recv()
    }
}

impl<T: GamepadSource + ?Sized> GamepadSource for Box<T> {
    fn poll_buttons(&mut self) -> Result<Option<ButtonState>> {
        (**self).poll_buttons()
    }
}

impl<T: ThrottleSource + ?Sized> ThrottleSource for Box<T> {
    fn read_throttle(&mut self) -> Result<Option<f64>> {
        (**self).read_throttle()
    }
}

/// In-memory CAN source that hands out queued frames in order
///
/// Used to replay recorded logs and to script the bus in tests.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    frames: VecDeque<CanFrame>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: CanFrame) {
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<CanFrame> for FrameQueue {
    fn from_iter<I: IntoIterator<Item = CanFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

impl CanSource for FrameQueue {
    fn try_recv(&mut self) -> Result<Option<CanFrame>> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_option() {
        let available: Source<u8> = Some(3).into();
        assert!(available.is_available());
        let missing: Source<u8> = None.into();
        assert!(!missing.is_available());
        assert!(!Source::<u8>::default().is_available());
    }

    #[test]
    fn test_frame_queue_drains_in_order() {
        let mut queue: FrameQueue = vec![
            CanFrame::new(0x123, vec![1, 0, 0, 0]),
            CanFrame::new(0x124, vec![2, 0, 0, 0]),
        ]
        .into_iter()
        .collect();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_recv().unwrap().unwrap().can_id, 0x123);
        assert_eq!(queue.try_recv().unwrap().unwrap().can_id, 0x124);
        assert!(queue.try_recv().unwrap().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut boxed: Box<dyn CanSource> =
            Box::new(FrameQueue::from_iter([CanFrame::new(1, vec![])]));
        assert!(boxed.try_recv().unwrap().is_some());
        assert!(boxed.try_recv().unwrap().is_none());
    }
}
