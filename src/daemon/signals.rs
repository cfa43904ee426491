//! Termination signal handling: an atomic flag plus a channel so the
//! inter-cycle sleep wakes immediately instead of timing out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::core::errors::{Result, WatchdogError};

/// Signals that end the daemon. All of them converge on the same
/// cleanup path.
const TERMINATION_SIGNALS: [i32; 3] = [SIGHUP, SIGINT, SIGTERM];

/// Handle the main loop polls between and during sleeps.
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    receiver: Receiver<i32>,
}

/// Register the termination handlers. The forwarding thread parks on
/// the signal iterator for the process lifetime.
pub fn install() -> Result<ShutdownSignal> {
    let flag = Arc::new(AtomicBool::new(false));
    for signal in TERMINATION_SIGNALS {
        signal_hook::flag::register(signal, Arc::clone(&flag)).map_err(|e| {
            WatchdogError::SignalSetup {
                details: e.to_string(),
            }
        })?;
    }
    let mut signals =
        Signals::new(TERMINATION_SIGNALS).map_err(|e| WatchdogError::SignalSetup {
            details: e.to_string(),
        })?;
    let (sender, receiver) = bounded(TERMINATION_SIGNALS.len());
    std::thread::spawn(move || {
        for signal in signals.forever() {
            if sender.send(signal).is_err() {
                break;
            }
        }
    });
    Ok(ShutdownSignal { flag, receiver })
}

impl ShutdownSignal {
    #[must_use]
    pub fn triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep up to `duration`, returning true when a termination signal
    /// arrived before or during the wait.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.triggered() {
            return true;
        }
        match self.receiver.recv_timeout(duration) {
            Ok(_) => true,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => self.triggered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::install;
    use std::time::{Duration, Instant};

    #[test]
    fn sleep_times_out_when_no_signal_arrives() {
        let signal = install().expect("install handlers");
        assert!(!signal.triggered());
        let started = Instant::now();
        assert!(!signal.sleep(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
