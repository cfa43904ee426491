//! Heartbeat monitor: detects gaps in the watchdog's own execution.
//!
//! The persisted beat survives restarts, which is the point: a crash or
//! host suspend leaves a stale beat behind, and the next successful run
//! reads it back and reports the gap after the fact. A clean shutdown
//! removes the beat so an intentional stop stays quiet.

use std::rc::Rc;

use chrono::{DateTime, Utc};

use crate::core::config::HeartbeatConfig;
use crate::logger::{EventKind, EventLogger, HeartbeatEvent, HeartbeatStatus, OutageEvent};
use crate::notify::queue::Category;
use crate::notify::Notifier;
use crate::platform::pal::Clock;
use crate::store::{decode_timestamp, encode_timestamp, StateStore, KEY_HEARTBEAT};

use super::format_duration;

pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    clock: Rc<dyn Clock>,
    logger: Rc<EventLogger>,
    store: Rc<dyn StateStore>,
    last_check: Option<DateTime<Utc>>,
}

impl HeartbeatMonitor {
    pub fn new(
        config: HeartbeatConfig,
        clock: Rc<dyn Clock>,
        logger: Rc<EventLogger>,
        store: Rc<dyn StateStore>,
    ) -> Self {
        Self {
            config,
            clock,
            logger,
            store,
            last_check: None,
        }
    }

    /// Throttled entry point, called once per cycle; the store is
    /// touched at most once per cadence window of wall clock.
    pub fn check(&mut self, notifier: &mut Notifier) {
        let now = self.clock.now();
        if let Some(last) = self.last_check {
            if (now - last).num_seconds() < self.config.check_cadence_secs as i64 {
                return;
            }
        }
        self.last_check = Some(now);
        self.run_check(notifier, now);
    }

    fn write_beat(&self, at: DateTime<Utc>) {
        let _ = self.store.write(KEY_HEARTBEAT, &encode_timestamp(at));
    }

    fn run_check(&mut self, notifier: &mut Notifier, now: DateTime<Utc>) {
        let last_beat = self
            .store
            .read(KEY_HEARTBEAT)
            .ok()
            .flatten()
            .and_then(|raw| decode_timestamp(KEY_HEARTBEAT, &raw).ok());
        let Some(last_beat) = last_beat else {
            // First run, or a corrupt value: start a fresh baseline.
            self.write_beat(now);
            self.logger.heartbeat(&HeartbeatEvent {
                status: HeartbeatStatus::Initialized,
                at: now,
                elapsed_secs: None,
            });
            return;
        };

        let elapsed = (now - last_beat).num_seconds();
        let interval = self.config.interval_secs as i64;
        if elapsed < interval {
            // Too soon to re-judge; the stored beat stays as is.
            return;
        }

        if elapsed < interval * i64::from(self.config.missed_threshold) {
            self.logger.heartbeat(&HeartbeatEvent {
                status: HeartbeatStatus::Normal,
                at: now,
                elapsed_secs: Some(elapsed),
            });
            if self.config.notify_normal {
                notifier.notify(
                    Category::Heartbeat,
                    &format!("Watchdog alive; previous beat {} ago.", format_duration(elapsed)),
                );
            }
        } else {
            // The gap spans enough missed intervals that the process
            // itself must have been down, suspended, or crashed.
            self.logger.heartbeat(&HeartbeatEvent {
                status: HeartbeatStatus::Interrupted,
                at: now,
                elapsed_secs: Some(elapsed),
            });
            self.logger.outage(&OutageEvent {
                kind: EventKind::ScriptInterrupted,
                started_at: last_beat,
                duration_secs: Some(elapsed),
                detail: format!("no heartbeat for {}", format_duration(elapsed)),
            });
            notifier.notify(
                Category::Alert,
                &format!(
                    "Watchdog was not running for {} (last beat {}).",
                    format_duration(elapsed),
                    last_beat.to_rfc3339()
                ),
            );
        }
        self.write_beat(now);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Duration;

    use super::HeartbeatMonitor;
    use crate::core::config::HeartbeatConfig;
    use crate::logger::EventLogger;
    use crate::notify::Notifier;
    use crate::platform::pal::test_support::{FakeClock, RecordingTransport, ScriptedProber};
    use crate::store::{MemoryStore, StateStore, KEY_HEARTBEAT};

    struct Harness {
        monitor: HeartbeatMonitor,
        notifier: Notifier,
        transport: Rc<RecordingTransport>,
        clock: Rc<FakeClock>,
        store: MemoryStore,
        logs: tempfile::TempDir,
    }

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval_secs: 3600,
            missed_threshold: 3,
            check_cadence_secs: 60,
            notify_normal: false,
        }
    }

    fn harness(config: HeartbeatConfig) -> Harness {
        let logs = tempfile::tempdir().expect("tempdir");
        let logger = Rc::new(EventLogger::open(logs.path(), 1_000_000).expect("open logger"));
        let clock = Rc::new(FakeClock::default());
        let store = MemoryStore::default();
        let transport = Rc::new(RecordingTransport::default());
        let notifier = Notifier::new(
            Box::new(Rc::clone(&transport)),
            Box::new(ScriptedProber::new(true)),
            clock.clone(),
            Rc::clone(&logger),
            Rc::new(store.clone()),
            "198.51.100.1".to_string(),
            160,
        );
        let monitor = HeartbeatMonitor::new(
            config,
            clock.clone(),
            logger,
            Rc::new(store.clone()),
        );
        Harness {
            monitor,
            notifier,
            transport,
            clock,
            store,
            logs,
        }
    }

    fn beat_statuses(dir: &Path) -> Vec<String> {
        let raw = std::fs::read_to_string(dir.join("heartbeat.jsonl")).unwrap_or_default();
        raw.lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|v| v.get("status").and_then(|s| s.as_str()).map(str::to_string))
            .collect()
    }

    #[test]
    fn first_check_initializes_without_notifying() {
        let mut h = harness(config());
        h.monitor.check(&mut h.notifier);
        assert_eq!(beat_statuses(h.logs.path()), vec!["initialized"]);
        assert!(h.store.read(KEY_HEARTBEAT).unwrap().is_some());
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn below_interval_leaves_the_beat_untouched() {
        let mut h = harness(config());
        h.monitor.check(&mut h.notifier);
        let stored = h.store.read(KEY_HEARTBEAT).unwrap();
        h.clock.advance(Duration::from_secs(600));
        h.monitor.check(&mut h.notifier);
        assert_eq!(beat_statuses(h.logs.path()), vec!["initialized"]);
        assert_eq!(h.store.read(KEY_HEARTBEAT).unwrap(), stored);
    }

    #[test]
    fn normal_gap_logs_without_notifying() {
        let mut h = harness(config());
        h.monitor.check(&mut h.notifier);
        h.clock.advance(Duration::from_secs(3700));
        h.monitor.check(&mut h.notifier);
        assert_eq!(beat_statuses(h.logs.path()), vec!["initialized", "normal"]);
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn long_gap_reports_a_script_interruption() {
        let mut h = harness(config());
        h.monitor.check(&mut h.notifier);
        h.clock.advance(Duration::from_secs(3 * 3600));
        h.monitor.check(&mut h.notifier);
        assert_eq!(
            beat_statuses(h.logs.path()),
            vec!["initialized", "interrupted"]
        );
        let downtime =
            std::fs::read_to_string(h.logs.path().join("downtime.jsonl")).unwrap_or_default();
        assert!(downtime.contains("script_interrupted"));
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("[ALERT]"));
        assert!(sent[0].contains("not running"));
    }

    #[test]
    fn checks_are_throttled_to_the_cadence() {
        let mut h = harness(config());
        h.monitor.check(&mut h.notifier);
        h.clock.advance(Duration::from_secs(3700));
        h.monitor.check(&mut h.notifier);
        // Within the cadence window, a second call does nothing.
        h.clock.advance(Duration::from_secs(10));
        h.monitor.check(&mut h.notifier);
        assert_eq!(beat_statuses(h.logs.path()), vec!["initialized", "normal"]);
    }

    #[test]
    fn corrupt_stored_beat_reinitializes() {
        let mut h = harness(config());
        h.store.write(KEY_HEARTBEAT, "not a timestamp").unwrap();
        h.monitor.check(&mut h.notifier);
        assert_eq!(beat_statuses(h.logs.path()), vec!["initialized"]);
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn optional_normal_heartbeat_notification() {
        let mut cfg = config();
        cfg.notify_normal = true;
        let mut h = harness(cfg);
        h.monitor.check(&mut h.notifier);
        h.clock.advance(Duration::from_secs(3700));
        h.monitor.check(&mut h.notifier);
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("[HEARTBEAT]"));
    }
}
