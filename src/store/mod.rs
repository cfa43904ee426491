//! Durable state: a tiny key-value store behind a narrow seam.
//!
//! Each persisted value (heartbeat timestamp, last interface reset, last
//! startup, queue scratch) is one small file under the state directory,
//! replaced atomically so a concurrently starting instance never reads a
//! partial write. The in-memory variant backs the tests, including
//! simulated restarts that reuse the same map.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::errors::{Result, WatchdogError};

/// Persisted heartbeat timestamp.
pub const KEY_HEARTBEAT: &str = "heartbeat";
/// Timestamp of the last interface reset; gates reset storms.
pub const KEY_LAST_RESET: &str = "last_reset";
/// Timestamp of the last daemon start; gates the Start notification.
pub const KEY_LAST_START: &str = "last_start";
/// JSON scratch copy of the undelivered message queue.
pub const KEY_QUEUE: &str = "queue";

/// Narrow persistence seam. Values are opaque strings; callers own the
/// encoding.
pub trait StateStore {
    fn read(&self, key: &str) -> Result<Option<String>>;
    /// Atomic replace: a reader sees either the old value or the new one.
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Encode a timestamp for storage.
#[must_use]
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Decode a stored timestamp. Corrupt values surface as `NWD-2002` so
/// callers can decide between re-initializing and failing.
pub fn decode_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| WatchdogError::CorruptState {
            key: key.to_string(),
            details: e.to_string(),
        })
}

/// File-per-key store with write-then-rename replacement.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| WatchdogError::io(&dir, e))?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.state"))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.state.tmp"))
    }
}

impl StateStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WatchdogError::io(&path, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let tmp = self.tmp_path(key);
        let path = self.key_path(key);
        std::fs::write(&tmp, value).map_err(|e| WatchdogError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| WatchdogError::io(&path, e))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WatchdogError::io(&path, e)),
        }
    }
}

/// Shared in-memory store. Cloning shares the underlying map, which is
/// how tests simulate state surviving a process restart.
#[derive(Default, Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}
