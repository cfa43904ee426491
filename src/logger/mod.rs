//! Structured operator logs: three append-only JSONL streams (events,
//! downtime, heartbeat) with bounded size and best-effort degradation.
//!
//! Unwritable paths are fatal when the logger is opened at startup; after
//! that, failed appends retry once into a scratch directory and are
//! otherwise dropped — the monitoring loop never crashes over a log line.

pub mod jsonl;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use jsonl::JsonlWriter;

/// Outage and recovery event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RouterLost,
    RouterRestored,
    InternetLost,
    InternetRestored,
    ScriptInterrupted,
    RecoveryFailed,
}

/// Append-only outage record. Never mutated after creation; exactly one
/// `*Restored`/`RecoveryFailed` record closes a given outage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutageEvent {
    pub kind: EventKind,
    pub started_at: DateTime<Utc>,
    /// Set on closing events; open events carry no duration yet.
    pub duration_secs: Option<i64>,
    pub detail: String,
}

/// Heartbeat check classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Initialized,
    Normal,
    Interrupted,
}

/// One heartbeat check outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub status: HeartbeatStatus,
    pub at: DateTime<Utc>,
    pub elapsed_secs: Option<i64>,
}

/// One notification delivery attempt, queued or sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub category: String,
    pub at: DateTime<Utc>,
    pub delivered: bool,
    pub queued: bool,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Note<'a> {
    at: DateTime<Utc>,
    detail: &'a str,
}

/// The three partitioned operator logs.
pub struct EventLogger {
    events: JsonlWriter,
    downtime: JsonlWriter,
    heartbeat: JsonlWriter,
    fallback_dir: PathBuf,
    max_bytes: u64,
}

impl EventLogger {
    /// Open the log directory, creating it if needed. Fails when the
    /// directory cannot be created or written — startup treats that as
    /// fatal.
    pub fn open(log_dir: &Path, max_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| crate::core::errors::WatchdogError::io(log_dir, e))?;
        let logger = Self {
            events: JsonlWriter::new(log_dir.join("events.jsonl"), max_bytes),
            downtime: JsonlWriter::new(log_dir.join("downtime.jsonl"), max_bytes),
            heartbeat: JsonlWriter::new(log_dir.join("heartbeat.jsonl"), max_bytes),
            fallback_dir: std::env::temp_dir().join("nwd-logs"),
            max_bytes,
        };
        // Probe writability up front; after startup the same condition
        // degrades instead.
        logger.events.append(&Note {
            at: Utc::now(),
            detail: "log stream opened",
        })?;
        Ok(logger)
    }

    fn append_degrading(&self, writer: &JsonlWriter, record: &impl Serialize) {
        if writer.append(record).is_ok() {
            return;
        }
        // Primary path went away after startup; fall back to scratch.
        if std::fs::create_dir_all(&self.fallback_dir).is_err() {
            return;
        }
        if let Some(name) = writer.path().file_name() {
            let scratch = JsonlWriter::new(self.fallback_dir.join(name), self.max_bytes);
            let _ = scratch.append(record);
        }
    }

    /// Record an outage or recovery in the events and downtime logs.
    pub fn outage(&self, event: &OutageEvent) {
        self.append_degrading(&self.events, event);
        self.append_degrading(&self.downtime, event);
    }

    /// Record a heartbeat check outcome.
    pub fn heartbeat(&self, event: &HeartbeatEvent) {
        self.append_degrading(&self.heartbeat, event);
    }

    /// Record a notification delivery attempt.
    pub fn notification(&self, attempt: &NotificationAttempt) {
        self.append_degrading(&self.events, attempt);
    }

    /// Record a free-form lifecycle line (startup, shutdown, reset
    /// failures).
    pub fn note(&self, at: DateTime<Utc>, detail: &str) {
        self.append_degrading(&self.events, &Note { at, detail });
    }
}
