//! Configuration surface: TOML-backed, validated once at startup.
//!
//! Every tunable the watchdog consults lives here; components receive the
//! parsed struct at construction and never read ambient state. Invalid
//! values are fatal at startup (`NWD-1001`) — after startup the daemon
//! only degrades, it never re-validates.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, WatchdogError};

/// Probe targets and the interface under watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Gateway address probed every cycle.
    pub router_address: String,
    /// DNS-anchor addresses; one reachable anchor means the internet is up.
    pub dns_anchors: Vec<String>,
    /// Interface cycled on recovery.
    pub interface: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            router_address: "192.168.1.1".to_string(),
            dns_anchors: vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()],
            interface: "eth0".to_string(),
        }
    }
}

/// Shape of a single reachability probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Echo requests per probe; the probe succeeds on the first reply.
    pub count: u32,
    /// Per-request reply timeout in seconds.
    pub timeout_secs: u64,
    /// Echo payload size in bytes.
    pub payload_bytes: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: 2,
            timeout_secs: 3,
            payload_bytes: 56,
        }
    }
}

/// Reconnection sub-loop and outer-cycle pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Interface-reset attempts before declaring recovery failed.
    pub max_retries: u32,
    /// Fixed pause between reconnection attempts, in seconds.
    pub retry_delay_secs: u64,
    /// Floor between two interface resets triggered by internet-only
    /// degradation, in seconds.
    pub restart_interval_secs: u64,
    /// Base delay between outer monitoring cycles, in seconds.
    pub base_cycle_delay_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_delay_secs: 15,
            restart_interval_secs: 300,
            base_cycle_delay_secs: 30,
        }
    }
}

/// Internet-only degradation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternetConfig {
    /// Consecutive failures before the fixed extra backoff kicks in and
    /// the short-cycle counter resets.
    pub max_failures: u32,
    /// Consecutive failures before the outage is notified. Much higher
    /// than `max_failures` so short degradations stay quiet.
    pub notify_threshold: u32,
}

impl Default for InternetConfig {
    fn default() -> Self {
        Self {
            max_failures: 10,
            notify_threshold: 50,
        }
    }
}

/// Liveness self-check pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Expected gap between recorded beats, in seconds.
    pub interval_secs: u64,
    /// Multiples of the interval after which a gap counts as a script
    /// interruption rather than a slow loop.
    pub missed_threshold: u32,
    /// Minimum wall-clock spacing between heartbeat checks, in seconds.
    pub check_cadence_secs: u64,
    /// Send a Heartbeat-category message on every NORMAL beat.
    pub notify_normal: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            missed_threshold: 3,
            check_cadence_secs: 60,
            notify_normal: false,
        }
    }
}

/// Notification transport and queueing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Gateway command the message body is piped to.
    pub transport_command: String,
    /// Recipient address handed to the gateway command.
    pub transport_address: String,
    /// Host probed (single packet) to decide whether the channel has a
    /// path at all. Distinct from the main connectivity probes.
    pub probe_address: String,
    /// Transport length limit; bodies are truncated to fit.
    pub max_message_len: usize,
    /// Suppress the Start notification when the previous start was this
    /// recent, in seconds. Keeps supervisor restart loops quiet.
    pub startup_dedup_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            transport_command: "nwd-gateway".to_string(),
            transport_address: String::new(),
            probe_address: "1.1.1.1".to_string(),
            max_message_len: 160,
            startup_dedup_secs: 600,
        }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the persisted key-value state.
    pub state_dir: PathBuf,
    /// Directory holding the JSONL logs.
    pub log_dir: PathBuf,
    /// Singleton lock file.
    pub lock_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/nwd"),
            log_dir: PathBuf::from("/var/log/nwd"),
            lock_file: PathBuf::from("/run/nwd.lock"),
        }
    }
}

/// Log rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Rotate a log once it exceeds this many bytes.
    pub max_log_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_log_bytes: 1_048_576,
        }
    }
}

/// Root configuration, one table per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub probe: ProbeConfig,
    pub recovery: RecoveryConfig,
    pub internet: InternetConfig,
    pub heartbeat: HeartbeatConfig,
    pub notify: NotifyConfig,
    pub paths: PathsConfig,
    pub logs: LogConfig,
}

/// Hostname labels per RFC 1123: alphanumeric with interior hyphens.
const HOSTNAME_PATTERN: &str =
    r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)*[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$";

fn is_valid_address(address: &str) -> bool {
    if address.parse::<IpAddr>().is_ok() {
        return true;
    }
    // Compiled per call; validation runs once at startup.
    Regex::new(HOSTNAME_PATTERN)
        .map(|re| re.is_match(address))
        .unwrap_or(false)
}

impl Config {
    /// Load and parse a TOML config file. Missing file is a distinct
    /// error so callers can fall back to defaults where appropriate.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(WatchdogError::MissingConfig {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| WatchdogError::io(path, e))?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Validate every field the daemon will rely on. Called once at
    /// startup; any failure here is fatal.
    pub fn validate(&self) -> Result<()> {
        let fail = |details: String| Err(WatchdogError::InvalidConfig { details });

        if !is_valid_address(&self.network.router_address) {
            return fail(format!(
                "network.router_address {:?} is not an IP address or hostname",
                self.network.router_address
            ));
        }
        if self.network.dns_anchors.is_empty() {
            return fail("network.dns_anchors must name at least one anchor".to_string());
        }
        for anchor in &self.network.dns_anchors {
            if !is_valid_address(anchor) {
                return fail(format!(
                    "network.dns_anchors entry {anchor:?} is not an IP address or hostname"
                ));
            }
        }
        if self.network.interface.is_empty() {
            return fail("network.interface must not be empty".to_string());
        }
        if self.probe.count == 0 {
            return fail("probe.count must be at least 1".to_string());
        }
        if self.probe.timeout_secs == 0 {
            return fail("probe.timeout_secs must be at least 1".to_string());
        }
        if self.recovery.max_retries == 0 {
            return fail("recovery.max_retries must be at least 1".to_string());
        }
        if self.recovery.base_cycle_delay_secs == 0 {
            return fail("recovery.base_cycle_delay_secs must be at least 1".to_string());
        }
        if self.internet.max_failures == 0 {
            return fail("internet.max_failures must be at least 1".to_string());
        }
        if self.internet.notify_threshold <= self.internet.max_failures {
            return fail(format!(
                "internet.notify_threshold ({}) must exceed internet.max_failures ({})",
                self.internet.notify_threshold, self.internet.max_failures
            ));
        }
        if self.heartbeat.interval_secs < self.heartbeat.check_cadence_secs {
            return fail(format!(
                "heartbeat.interval_secs ({}) must be at least the check cadence ({})",
                self.heartbeat.interval_secs, self.heartbeat.check_cadence_secs
            ));
        }
        if self.heartbeat.missed_threshold < 2 {
            return fail("heartbeat.missed_threshold must be at least 2".to_string());
        }
        if self.notify.transport_command.is_empty() {
            return fail("notify.transport_command must not be empty".to_string());
        }
        if !is_valid_address(&self.notify.probe_address) {
            return fail(format!(
                "notify.probe_address {:?} is not an IP address or hostname",
                self.notify.probe_address
            ));
        }
        if self.notify.max_message_len < 40 {
            return fail("notify.max_message_len must be at least 40".to_string());
        }
        if self.paths.state_dir.as_os_str().is_empty()
            || self.paths.log_dir.as_os_str().is_empty()
            || self.paths.lock_file.as_os_str().is_empty()
        {
            return fail("paths.state_dir, paths.log_dir and paths.lock_file are required".to_string());
        }
        if self.logs.max_log_bytes == 0 {
            return fail("logs.max_log_bytes must be at least 1".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.recovery.retry_delay_secs)
    }

    #[must_use]
    pub fn base_cycle_delay(&self) -> Duration {
        Duration::from_secs(self.recovery.base_cycle_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::core::errors::WatchdogError;

    #[test]
    fn default_config_validates() {
        Config::default()
            .validate()
            .expect("defaults must be internally consistent");
    }

    #[test]
    fn rejects_garbage_router_address() {
        let mut config = Config::default();
        config.network.router_address = "not an address!".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "NWD-1001");
    }

    #[test]
    fn rejects_empty_anchor_list() {
        let mut config = Config::default();
        config.network.dns_anchors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_notify_threshold_below_backoff_threshold() {
        let mut config = Config::default();
        config.internet.notify_threshold = config.internet.max_failures;
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_hostnames_and_ips() {
        let mut config = Config::default();
        config.network.router_address = "gateway.lan".to_string();
        config.network.dns_anchors = vec!["2606:4700:4700::1111".to_string()];
        config.validate().expect("hostname and IPv6 anchors are valid");
    }

    #[test]
    fn missing_file_is_a_distinct_error() {
        let err = Config::load(std::path::Path::new("/nonexistent/nwd.toml")).unwrap_err();
        assert!(matches!(err, WatchdogError::MissingConfig { .. }));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [network]
            router_address = "10.0.0.1"
            "#,
        )
        .expect("partial config must parse");
        assert_eq!(parsed.network.router_address, "10.0.0.1");
        assert_eq!(parsed.recovery.max_retries, 10);
        assert_eq!(parsed.notify.max_message_len, 160);
    }
}
