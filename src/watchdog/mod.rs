//! Watchdog core: connectivity state machine, cycle backoff, heartbeat
//! monitor.

pub mod backoff;
pub mod heartbeat;
pub mod machine;

/// Render a second count the way it appears in notifications and log
/// details.
#[must_use]
pub fn format_duration(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
