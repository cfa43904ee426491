//! Daemon entry point: startup sequencing and the infinite
//! check-act-sleep cycle.

use std::rc::Rc;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::logger::EventLogger;
use crate::notify::queue::Category;
use crate::notify::Notifier;
use crate::platform::pal::Clock;
use crate::platform::system::{CommandTransport, PingProber, SystemClock, SystemLink};
use crate::store::{decode_timestamp, encode_timestamp, FileStore, StateStore, KEY_LAST_START};
use crate::watchdog::backoff::cycle_delay;
use crate::watchdog::heartbeat::HeartbeatMonitor;
use crate::watchdog::machine::StateMachine;

use super::lock::SingletonLock;
use super::shutdown::Cleanup;
use super::signals;

/// Run the watchdog until a termination signal arrives. The config must
/// already be validated; everything fatal happens before the first
/// cycle, after which the loop only degrades.
pub fn run(config: &Config) -> Result<()> {
    let lock = SingletonLock::acquire(&config.paths.lock_file)?;
    let logger = Rc::new(EventLogger::open(
        &config.paths.log_dir,
        config.logs.max_log_bytes,
    )?);
    let store: Rc<dyn StateStore> = Rc::new(FileStore::open(&config.paths.state_dir)?);
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let signal = signals::install()?;

    let mut notifier = Notifier::new(
        Box::new(CommandTransport::new(
            config.notify.transport_command.clone(),
            config.notify.transport_address.clone(),
        )),
        Box::new(PingProber),
        Rc::clone(&clock),
        Rc::clone(&logger),
        Rc::clone(&store),
        config.notify.probe_address.clone(),
        config.notify.max_message_len,
    );
    let mut machine = StateMachine::new(
        config,
        Box::new(PingProber),
        Box::new(SystemLink::default()),
        Rc::clone(&clock),
        Rc::clone(&logger),
        Rc::clone(&store),
    );
    let mut heartbeat = HeartbeatMonitor::new(
        config.heartbeat.clone(),
        Rc::clone(&clock),
        Rc::clone(&logger),
        Rc::clone(&store),
    );
    let mut cleanup = Cleanup::new(
        Box::new(SystemLink::default()),
        config.network.interface.clone(),
        Rc::clone(&store),
        Rc::clone(&logger),
        Rc::clone(&clock),
        Some(lock),
    );

    announce_start(config, &mut notifier, &*store, &*clock, &logger);

    while !signal.triggered() {
        heartbeat.check(&mut notifier);
        let report = machine.run_cycle(&mut notifier);
        let delay = report.extra_backoff.unwrap_or_else(|| {
            cycle_delay(config.base_cycle_delay(), report.backoff_failures)
        });
        if signal.sleep(delay) {
            break;
        }
    }

    cleanup.run();
    Ok(())
}

/// Send the Start notification unless the previous start was recent
/// enough to be a supervisor restart loop.
fn announce_start(
    config: &Config,
    notifier: &mut Notifier,
    store: &dyn StateStore,
    clock: &dyn Clock,
    logger: &EventLogger,
) {
    let now = clock.now();
    let recently_started = store
        .read(KEY_LAST_START)
        .ok()
        .flatten()
        .and_then(|raw| decode_timestamp(KEY_LAST_START, &raw).ok())
        .is_some_and(|last| (now - last).num_seconds() < config.notify.startup_dedup_secs as i64);
    if recently_started {
        logger.note(now, "start notification suppressed by dedup window");
    } else {
        notifier.notify(
            Category::Start,
            &format!(
                "Connectivity watchdog started; monitoring gateway {} on {}.",
                config.network.router_address, config.network.interface
            ),
        );
    }
    let _ = store.write(KEY_LAST_START, &encode_timestamp(now));
    logger.note(now, "daemon started");
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use super::announce_start;
    use crate::core::config::Config;
    use crate::logger::EventLogger;
    use crate::notify::Notifier;
    use crate::platform::pal::test_support::{FakeClock, RecordingTransport, ScriptedProber};
    use crate::platform::pal::Clock as _;
    use crate::store::{encode_timestamp, MemoryStore, StateStore, KEY_LAST_START};

    fn notifier_over(
        transport: &Rc<RecordingTransport>,
        clock: &Rc<FakeClock>,
        store: &MemoryStore,
        logger: &Rc<EventLogger>,
    ) -> Notifier {
        Notifier::new(
            Box::new(Rc::clone(transport)),
            Box::new(ScriptedProber::new(true)),
            clock.clone(),
            Rc::clone(logger),
            Rc::new(store.clone()),
            "198.51.100.1".to_string(),
            160,
        )
    }

    #[test]
    fn fresh_start_announces_and_records_the_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logger = Rc::new(EventLogger::open(dir.path(), 1_000_000).expect("open logger"));
        let clock = Rc::new(FakeClock::default());
        let store = MemoryStore::default();
        let transport = Rc::new(RecordingTransport::default());
        let mut notifier = notifier_over(&transport, &clock, &store, &logger);

        announce_start(&Config::default(), &mut notifier, &store, &*clock, &logger);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("[START]"));
        assert!(store.read(KEY_LAST_START).unwrap().is_some());
    }

    #[test]
    fn restart_inside_the_dedup_window_stays_quiet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logger = Rc::new(EventLogger::open(dir.path(), 1_000_000).expect("open logger"));
        let clock = Rc::new(FakeClock::default());
        let store = MemoryStore::default();
        let transport = Rc::new(RecordingTransport::default());
        let mut notifier = notifier_over(&transport, &clock, &store, &logger);

        store
            .write(KEY_LAST_START, &encode_timestamp(clock.now()))
            .unwrap();
        clock.advance(Duration::from_secs(120));
        announce_start(&Config::default(), &mut notifier, &store, &*clock, &logger);
        assert!(transport.sent().is_empty());

        // Past the window the announcement returns.
        let window = Config::default().notify.startup_dedup_secs;
        clock.advance(Duration::from_secs(window + 1));
        announce_start(&Config::default(), &mut notifier, &store, &*clock, &logger);
        assert_eq!(transport.sent().len(), 1);
    }
}
