//! Append-only JSONL writer with size-threshold rotation.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{Result, WatchdogError};

/// One log file: a record per line, rotated to a single `.1` sibling
/// once the size threshold is crossed.
pub struct JsonlWriter {
    path: PathBuf,
    max_bytes: u64,
}

impl JsonlWriter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let size = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(WatchdogError::io(&self.path, e)),
        };
        if size < self.max_bytes {
            return Ok(());
        }
        let mut rotated = self.path.as_os_str().to_owned();
        rotated.push(".1");
        std::fs::rename(&self.path, PathBuf::from(rotated))
            .map_err(|e| WatchdogError::io(&self.path, e))?;
        Ok(())
    }

    /// Append one record as a JSON line.
    pub fn append(&self, record: &impl Serialize) -> Result<()> {
        self.rotate_if_needed()?;
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WatchdogError::io(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| WatchdogError::io(&self.path, e))?;
        Ok(())
    }
}
