//! CAN log file parsers
//!
//! Recorded bus traffic can be replayed through the engine in place of a live
//! bus. Each parser implements an iterator pattern over CanFrame objects.

use crate::types::{CanFrame, Result};
use std::path::Path;

pub mod candump;

pub use candump::{parse_candump_line, parse_candump_str, CandumpFrameIterator, CandumpParser};

/// Common trait for all log file parsers
pub trait LogFileParser: Iterator<Item = Result<CanFrame>> + Sized {
    /// Parse a log file and return an iterator over CAN frames
    fn parse(path: &Path) -> Result<Self>;
}
