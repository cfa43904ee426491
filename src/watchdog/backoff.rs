//! Inter-cycle backoff: a pure function of the consecutive-failure count.

use std::time::Duration;

/// Failure counts at or below this keep the base delay.
const BACKOFF_KNEE: u32 = 5;
/// Input clamp bounding the exponent.
const BACKOFF_CLAMP: u32 = 10;
/// Hard ceiling on the computed delay.
const BACKOFF_CAP: Duration = Duration::from_secs(600);

/// Delay between outer monitoring cycles. Distinct from the fixed pause
/// used between reconnection attempts inside the recovery sub-loop.
///
/// Base delay through five consecutive failures, then doubling per
/// additional failure, capped at ten minutes.
#[must_use]
pub fn cycle_delay(base: Duration, consecutive_failures: u32) -> Duration {
    let failures = consecutive_failures.min(BACKOFF_CLAMP);
    if failures <= BACKOFF_KNEE {
        return base;
    }
    let factor = 1u32 << (failures - BACKOFF_KNEE);
    base.saturating_mul(factor).min(BACKOFF_CAP)
}
