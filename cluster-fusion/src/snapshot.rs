//! Drive-mode snapshot file reader
//!
//! The external control process writes its commanded direction to a small JSON
//! file, e.g. `{"direction": "F"}`. A snapshot counts only while its mtime is
//! within the freshness window.

use crate::types::DriveMode;
use serde_json::Value;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Upper bound on bytes read from the snapshot file per tick
pub const MAX_SNAPSHOT_BYTES: u64 = 4096;

/// Why a snapshot was not used this tick
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot unreadable: {0}")]
    Unreadable(#[from] io::Error),

    #[error("snapshot is stale ({age:?} old, limit {max_age:?})")]
    Stale { age: Duration, max_age: Duration },

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("snapshot is not a JSON object")]
    NotAnObject,

    #[error("unrecognized direction {0:?}")]
    UnrecognizedDirection(String),
}

/// Reads and validates the snapshot file
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    path: PathBuf,
    max_age: Duration,
}

impl SnapshotReader {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Read the commanded drive mode as of `now`
    ///
    /// A modification time in the future counts as fresh.
    pub fn read_mode(&self, now: SystemTime) -> Result<DriveMode, SnapshotError> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > self.max_age {
            return Err(SnapshotError::Stale {
                age,
                max_age: self.max_age,
            });
        }

        let mut content = String::new();
        File::open(&self.path)?
            .take(MAX_SNAPSHOT_BYTES)
            .read_to_string(&mut content)?;

        parse_snapshot(&content)
    }
}

/// Parse snapshot content into a drive mode
pub fn parse_snapshot(content: &str) -> Result<DriveMode, SnapshotError> {
    let value: Value = serde_json::from_str(content)?;
    let object = value.as_object().ok_or(SnapshotError::NotAnObject)?;

    let direction = match object.get("direction") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    DriveMode::from_symbol(&direction).ok_or(SnapshotError::UnrecognizedDirection(direction))
}
