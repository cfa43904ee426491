//! NWD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, WatchdogError>;

/// Top-level error type for the connectivity watchdog.
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("[NWD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[NWD-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[NWD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[NWD-2001] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[NWD-2002] corrupt persisted value for key {key}: {details}")]
    CorruptState { key: String, details: String },

    #[error("[NWD-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[NWD-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[NWD-3101] another watchdog instance holds the lock at {path}")]
    AlreadyRunning { path: PathBuf },

    #[error("[NWD-3102] signal handler registration failure: {details}")]
    SignalSetup { details: String },

    #[error("[NWD-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl WatchdogError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "NWD-1001",
            Self::MissingConfig { .. } => "NWD-1002",
            Self::ConfigParse { .. } => "NWD-1003",
            Self::Serialization { .. } => "NWD-2001",
            Self::CorruptState { .. } => "NWD-2002",
            Self::PermissionDenied { .. } => "NWD-3001",
            Self::Io { .. } => "NWD-3002",
            Self::AlreadyRunning { .. } => "NWD-3101",
            Self::SignalSetup { .. } => "NWD-3102",
            Self::Runtime { .. } => "NWD-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::CorruptState { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for WatchdogError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for WatchdogError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
