//! Connectivity state machine: debounced transitions, the reconnection
//! sub-loop, and internet-only degradation handling.
//!
//! A single instance owns all connectivity state for the process lifetime
//! and is driven one cycle at a time by the daemon loop. Every external
//! effect goes through the platform seams, so the whole machine runs
//! against in-memory fakes in tests.

use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::config::{Config, InternetConfig, NetworkConfig, ProbeConfig, RecoveryConfig};
use crate::logger::{EventKind, EventLogger, OutageEvent};
use crate::notify::queue::Category;
use crate::notify::Notifier;
use crate::platform::pal::{Clock, LinkControl, ProbeSpec, Prober};
use crate::store::{decode_timestamp, encode_timestamp, StateStore, KEY_LAST_RESET};

use super::format_duration;

/// Consecutive failed probes before an Up target counts as Down. A
/// single dropped probe is noise, not an outage.
const PROBE_DEBOUNCE: u32 = 2;
/// A Trying notification goes out on every Nth reconnection attempt.
const TRYING_CADENCE: u32 = 3;
/// Multiplier on the base cycle delay once the internet short-cycle
/// counter fills up.
const INTERNET_BACKOFF_FACTOR: u32 = 5;
/// Internet-only failures leave the interface alone until the
/// consecutive counter exceeds this floor...
const INTERNET_RESET_FLOOR: u32 = 5;
/// ...and even then a reset is only considered on every Nth increment.
const INTERNET_RESET_CADENCE: u32 = 5;

/// Reachability as the machine currently believes it.
///
/// Invariant: `router_down_since` is set exactly while
/// `router_reachable` is false, and holds the first observed failure of
/// the outage so durations measure the whole window, not the latest
/// retry. Same for the internet pair.
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    pub router_reachable: bool,
    pub internet_reachable: bool,
    pub router_down_since: Option<DateTime<Utc>>,
    pub internet_down_since: Option<DateTime<Utc>>,
    pub consecutive_router_failures: u32,
    pub consecutive_internet_failures: u32,
}

impl Default for ConnectivityState {
    fn default() -> Self {
        // Both targets are assumed up at process start; the first cycle
        // corrects the assumption.
        Self {
            router_reachable: true,
            internet_reachable: true,
            router_down_since: None,
            internet_down_since: None,
            consecutive_router_failures: 0,
            consecutive_internet_failures: 0,
        }
    }
}

/// What one cycle decided, consumed by the daemon loop for pacing.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    pub router_reachable: bool,
    pub internet_reachable: bool,
    /// Consecutive-failure count fed into the backoff curve.
    pub backoff_failures: u32,
    /// Fixed extra backoff replacing the normal cycle delay, applied
    /// when internet-only degradation fills its short-cycle counter.
    pub extra_backoff: Option<Duration>,
}

pub struct StateMachine {
    network: NetworkConfig,
    probe: ProbeConfig,
    recovery: RecoveryConfig,
    internet: InternetConfig,
    prober: Box<dyn Prober>,
    link: Box<dyn LinkControl>,
    clock: Rc<dyn Clock>,
    logger: Rc<EventLogger>,
    store: Rc<dyn StateStore>,
    state: ConnectivityState,
    /// Candidate outage start: set on the first failed probe, promoted
    /// to `*_down_since` once the debounce confirms, cleared on success.
    router_first_failure: Option<DateTime<Utc>>,
    internet_first_failure: Option<DateTime<Utc>>,
    /// Short-cycle counter behind the fixed internet backoff. Resets
    /// whenever it fills, independent of the consecutive counter.
    internet_short_cycle: u32,
    /// Whether the current internet outage crossed the notify threshold;
    /// recovery only sends OK for outages that were announced.
    internet_outage_notified: bool,
    /// At most one terminal event may close an outage per cycle.
    closed_this_cycle: bool,
}

impl StateMachine {
    pub fn new(
        config: &Config,
        prober: Box<dyn Prober>,
        link: Box<dyn LinkControl>,
        clock: Rc<dyn Clock>,
        logger: Rc<EventLogger>,
        store: Rc<dyn StateStore>,
    ) -> Self {
        Self {
            network: config.network.clone(),
            probe: config.probe.clone(),
            recovery: config.recovery.clone(),
            internet: config.internet.clone(),
            prober,
            link,
            clock,
            logger,
            store,
            state: ConnectivityState::default(),
            router_first_failure: None,
            internet_first_failure: None,
            internet_short_cycle: 0,
            internet_outage_notified: false,
            closed_this_cycle: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    fn probe_target(&self, address: &str) -> bool {
        let spec = ProbeSpec {
            address,
            count: self.probe.count,
            timeout: Duration::from_secs(self.probe.timeout_secs),
            payload_bytes: self.probe.payload_bytes,
        };
        self.prober.probe(&spec).reachable
    }

    fn retry_pause(&self) -> Duration {
        Duration::from_secs(self.recovery.retry_delay_secs)
    }

    /// Run one check-act cycle. Blocks for the full reconnection
    /// sub-loop while the router is down.
    pub fn run_cycle(&mut self, notifier: &mut Notifier) -> CycleReport {
        self.closed_this_cycle = false;

        if self.probe_target(&self.network.router_address) {
            self.handle_router_up(notifier);
        } else {
            self.handle_router_down(notifier);
        }

        let mut extra_backoff = None;
        if self.state.router_reachable {
            extra_backoff = self.check_internet(notifier);
        }

        CycleReport {
            router_reachable: self.state.router_reachable,
            internet_reachable: self.state.internet_reachable,
            backoff_failures: self
                .state
                .consecutive_router_failures
                .max(self.state.consecutive_internet_failures),
            extra_backoff,
        }
    }

    fn handle_router_up(&mut self, notifier: &mut Notifier) {
        if !self.state.router_reachable {
            // Came back on its own between cycles, without a reset.
            self.close_router_outage(notifier, None);
        }
        self.state.consecutive_router_failures = 0;
        self.router_first_failure = None;
    }

    fn handle_router_down(&mut self, notifier: &mut Notifier) {
        self.state.consecutive_router_failures += 1;
        if self.router_first_failure.is_none() {
            self.router_first_failure = Some(self.clock.now());
        }
        if self.state.router_reachable {
            if self.state.consecutive_router_failures < PROBE_DEBOUNCE {
                // Single dropped probe: no outage window, no log, no
                // notification.
                return;
            }
            self.open_router_outage(notifier);
        }
        self.reconnection_loop(notifier);
    }

    fn open_router_outage(&mut self, notifier: &mut Notifier) {
        let down_since = self
            .router_first_failure
            .unwrap_or_else(|| self.clock.now());
        self.state.router_reachable = false;
        self.state.router_down_since = Some(down_since);
        self.logger.outage(&OutageEvent {
            kind: EventKind::RouterLost,
            started_at: down_since,
            duration_secs: None,
            detail: format!(
                "gateway {} unreachable after {PROBE_DEBOUNCE} consecutive probes",
                self.network.router_address
            ),
        });
        notifier.notify(
            Category::Alert,
            &format!(
                "Gateway {} is unreachable. Starting interface recovery on {}.",
                self.network.router_address, self.network.interface
            ),
        );
    }

    fn record_interface_reset(&self, at: DateTime<Utc>) {
        // Best-effort: losing this timestamp only weakens reset-storm
        // gating until the next write.
        let _ = self.store.write(KEY_LAST_RESET, &encode_timestamp(at));
    }

    /// Up to `max_retries` rounds of reset-pause-reprobe. Runs every
    /// cycle while the router stays down; the open/close events are
    /// guarded elsewhere so re-entry never double-logs.
    fn reconnection_loop(&mut self, notifier: &mut Notifier) {
        let down_since = self
            .state
            .router_down_since
            .unwrap_or_else(|| self.clock.now());
        for attempt in 1..=self.recovery.max_retries {
            if !self.link.reset(&self.network.interface) {
                self.logger.note(
                    self.clock.now(),
                    &format!("interface reset attempt {attempt} reported failure"),
                );
            }
            self.record_interface_reset(self.clock.now());
            if attempt % TRYING_CADENCE == 0 {
                notifier.notify(
                    Category::Trying,
                    &format!(
                        "Still reconnecting: attempt {attempt}/{} on {}.",
                        self.recovery.max_retries, self.network.interface
                    ),
                );
            }
            self.clock.sleep(self.retry_pause());
            if self.probe_target(&self.network.router_address) {
                self.close_router_outage(notifier, Some(attempt));
                return;
            }
        }

        let now = self.clock.now();
        let elapsed = (now - down_since).num_seconds();
        if !self.closed_this_cycle {
            self.closed_this_cycle = true;
            self.logger.outage(&OutageEvent {
                kind: EventKind::RecoveryFailed,
                started_at: down_since,
                duration_secs: Some(elapsed),
                detail: format!("{} reset attempts exhausted", self.recovery.max_retries),
            });
            notifier.notify(
                Category::Critical,
                &format!(
                    "Recovery failed: gateway {} still down after {} reset attempts ({}). \
                     Manual intervention required.",
                    self.network.router_address,
                    self.recovery.max_retries,
                    format_duration(elapsed)
                ),
            );
        }
        // Left at 1, not 0: the next cycle retries immediately at the
        // base delay instead of idling in a clean state.
        self.state.consecutive_router_failures = 1;
    }

    fn close_router_outage(&mut self, notifier: &mut Notifier, attempts: Option<u32>) {
        let now = self.clock.now();
        let down_since = self.state.router_down_since.take();
        self.state.router_reachable = true;
        self.state.consecutive_router_failures = 0;
        self.router_first_failure = None;
        let Some(down_since) = down_since else {
            return;
        };
        if self.closed_this_cycle {
            return;
        }
        self.closed_this_cycle = true;
        let elapsed = (now - down_since).num_seconds();
        let detail = match attempts {
            Some(n) => format!("recovered after {n} reset attempts"),
            None => "recovered without an interface reset".to_string(),
        };
        self.logger.outage(&OutageEvent {
            kind: EventKind::RouterRestored,
            started_at: down_since,
            duration_secs: Some(elapsed),
            detail,
        });
        let body = match attempts {
            Some(n) => format!(
                "Gateway {} back after {} ({n} reset attempts).",
                self.network.router_address,
                format_duration(elapsed)
            ),
            None => format!(
                "Gateway {} back after {}.",
                self.network.router_address,
                format_duration(elapsed)
            ),
        };
        notifier.notify(Category::Ok, &body);
    }

    /// Internet check, only meaningful while the router answers. One
    /// reachable anchor means the internet is up.
    fn check_internet(&mut self, notifier: &mut Notifier) -> Option<Duration> {
        let now = self.clock.now();
        let reachable = self
            .network
            .dns_anchors
            .iter()
            .any(|anchor| self.probe_target(anchor));
        if reachable {
            if !self.state.internet_reachable {
                self.close_internet_outage(notifier, now);
            }
            self.state.consecutive_internet_failures = 0;
            self.internet_first_failure = None;
            self.internet_short_cycle = 0;
            return None;
        }

        self.state.consecutive_internet_failures += 1;
        self.internet_short_cycle += 1;
        if self.internet_first_failure.is_none() {
            self.internet_first_failure = Some(now);
        }

        if self.state.internet_reachable
            && self.state.consecutive_internet_failures >= PROBE_DEBOUNCE
        {
            let down_since = self.internet_first_failure.unwrap_or(now);
            self.state.internet_reachable = false;
            self.state.internet_down_since = Some(down_since);
            self.logger.outage(&OutageEvent {
                kind: EventKind::InternetLost,
                started_at: down_since,
                duration_secs: None,
                detail: format!(
                    "all {} dns anchors unreachable, gateway still up",
                    self.network.dns_anchors.len()
                ),
            });
        }

        let failures = self.state.consecutive_internet_failures;
        if failures == self.internet.notify_threshold {
            self.internet_outage_notified = true;
            notifier.notify(
                Category::Alert,
                &format!(
                    "Internet unreachable for {failures} consecutive checks \
                     (gateway {} is fine).",
                    self.network.router_address
                ),
            );
        }

        if failures > INTERNET_RESET_FLOOR && failures % INTERNET_RESET_CADENCE == 0 {
            self.maybe_reset_for_internet(now);
        }

        if self.internet_short_cycle >= self.internet.max_failures {
            self.internet_short_cycle = 0;
            return Some(
                Duration::from_secs(self.recovery.base_cycle_delay_secs)
                    * INTERNET_BACKOFF_FACTOR,
            );
        }
        None
    }

    /// Interface reset for persistent internet-only degradation, gated
    /// by the persisted last-reset timestamp to prevent reset storms.
    fn maybe_reset_for_internet(&mut self, now: DateTime<Utc>) {
        let last_reset = self
            .store
            .read(KEY_LAST_RESET)
            .ok()
            .flatten()
            .and_then(|raw| decode_timestamp(KEY_LAST_RESET, &raw).ok());
        let gated = last_reset.is_some_and(|last| {
            (now - last).num_seconds() < self.recovery.restart_interval_secs as i64
        });
        if gated {
            return;
        }
        self.logger.note(
            now,
            "cycling interface for persistent internet-only degradation",
        );
        if !self.link.reset(&self.network.interface) {
            self.logger
                .note(self.clock.now(), "interface reset reported failure");
        }
        self.record_interface_reset(self.clock.now());
    }

    fn close_internet_outage(&mut self, notifier: &mut Notifier, now: DateTime<Utc>) {
        let down_since = self.state.internet_down_since.take();
        self.state.internet_reachable = true;
        let notified = self.internet_outage_notified;
        self.internet_outage_notified = false;
        let Some(down_since) = down_since else {
            return;
        };
        if self.closed_this_cycle {
            // A router recovery already closed an outage this cycle; the
            // internet close happens silently.
            return;
        }
        self.closed_this_cycle = true;
        let elapsed = (now - down_since).num_seconds();
        self.logger.outage(&OutageEvent {
            kind: EventKind::InternetRestored,
            started_at: down_since,
            duration_secs: Some(elapsed),
            detail: "dns anchors reachable again".to_string(),
        });
        if notified {
            notifier.notify(
                Category::Ok,
                &format!("Internet back after {}.", format_duration(elapsed)),
            );
        }
    }
}
