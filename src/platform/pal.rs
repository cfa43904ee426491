//! Platform abstraction layer: the seams the core calls into.
//!
//! Probe transport, interface control, the notification gateway, and wall
//! clock are all external collaborators. The daemon wires in the system
//! implementations from [`crate::platform::system`]; tests wire in the
//! fakes from [`test_support`].

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Shape of one reachability check.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSpec<'a> {
    /// Target IP address or hostname.
    pub address: &'a str,
    /// Echo requests to send; the probe succeeds on the first reply.
    pub count: u32,
    /// Per-request reply timeout.
    pub timeout: Duration,
    /// Echo payload size in bytes.
    pub payload_bytes: u32,
}

/// Result of one reachability check. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub target: String,
    pub reachable: bool,
    pub latency: Option<Duration>,
}

/// Issues reachability checks with bounded timeouts.
pub trait Prober {
    fn probe(&self, spec: &ProbeSpec<'_>) -> ProbeResult;
}

/// Cycles or restores a network interface. Both operations must be safe
/// to call repeatedly.
pub trait LinkControl {
    /// Full down/up + DHCP lease cycle. Returns false when any step
    /// failed; the caller judges recovery by re-probing either way.
    fn reset(&self, interface: &str) -> bool;
    /// Bring the interface up without cycling it. Used by the shutdown
    /// path so the watchdog never leaves the link down.
    fn ensure_up(&self, interface: &str) -> bool;
}

/// Delivers one rendered message over the notification channel.
pub trait Transport {
    fn deliver(&self, text: &str) -> bool;
}

/// Wall clock and sleep, virtualized so scenario tests can run on
/// simulated time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}
