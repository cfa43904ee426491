//! Bounded retry with a fixed pause, shared by probe, send, and reset
//! call sites.

use std::time::Duration;

use crate::platform::pal::Clock;

/// Outcome of a bounded retry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Whether any attempt succeeded.
    pub succeeded: bool,
    /// Attempts actually made, including the successful one.
    pub attempts: u32,
}

/// Run `op` up to `max_attempts` times, pausing `pause` between attempts.
/// Stops at the first success. `max_attempts` of zero is treated as one.
pub fn retry_with_pause(
    clock: &dyn Clock,
    max_attempts: u32,
    pause: Duration,
    mut op: impl FnMut(u32) -> bool,
) -> RetryOutcome {
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if op(attempt) {
            return RetryOutcome {
                succeeded: true,
                attempts: attempt,
            };
        }
        if attempt < max_attempts && !pause.is_zero() {
            clock.sleep(pause);
        }
    }
    RetryOutcome {
        succeeded: false,
        attempts: max_attempts,
    }
}
