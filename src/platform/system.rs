//! System implementations of the platform seams: external `ping`,
//! `ip`/DHCP commands, and the notification gateway command. Every
//! invocation runs under an explicit deadline so no cycle can block
//! indefinitely on a wedged tool.

use std::io::Write as _;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::pal::{Clock, LinkControl, ProbeResult, ProbeSpec, Prober, Transport};

/// Poll interval while waiting on a spawned command.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// Headroom added on top of a probe's own timeout budget before the
/// process is killed outright.
const DEADLINE_SLACK: Duration = Duration::from_secs(2);

/// Wait for `child` up to `deadline`, killing it on overrun. Returns
/// whether the command exited successfully within the budget.
fn wait_with_deadline(mut child: Child, deadline: Duration) -> bool {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) => {
                if started.elapsed() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return false;
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(_) => return false,
        }
    }
}

fn spawn_quiet(command: &mut Command) -> Option<Child> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .ok()
}

/// ICMP echo prober shelling out to the system `ping`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PingProber;

impl Prober for PingProber {
    fn probe(&self, spec: &ProbeSpec<'_>) -> ProbeResult {
        let started = Instant::now();
        let mut command = Command::new("ping");
        command
            .arg("-c")
            .arg(spec.count.to_string())
            .arg("-W")
            .arg(spec.timeout.as_secs().max(1).to_string())
            .arg("-s")
            .arg(spec.payload_bytes.to_string())
            .arg(spec.address);

        let budget = spec.timeout * spec.count.max(1) + DEADLINE_SLACK;
        let reachable = match spawn_quiet(&mut command) {
            Some(child) => wait_with_deadline(child, budget),
            None => false,
        };
        ProbeResult {
            target: spec.address.to_string(),
            reachable,
            latency: reachable.then(|| started.elapsed()),
        }
    }
}

/// Interface control via `ip link` plus a DHCP renew.
#[derive(Debug, Clone)]
pub struct SystemLink {
    /// DHCP client invoked after the link comes back up.
    pub dhcp_command: String,
    /// Budget for each individual step.
    pub step_timeout: Duration,
}

impl Default for SystemLink {
    fn default() -> Self {
        Self {
            dhcp_command: "dhclient".to_string(),
            step_timeout: Duration::from_secs(30),
        }
    }
}

impl SystemLink {
    fn ip_link(&self, interface: &str, state: &str) -> bool {
        let mut command = Command::new("ip");
        command.args(["link", "set", interface, state]);
        match spawn_quiet(&mut command) {
            Some(child) => wait_with_deadline(child, self.step_timeout),
            None => false,
        }
    }

    fn renew_lease(&self, interface: &str) -> bool {
        let mut command = Command::new(&self.dhcp_command);
        command.arg(interface);
        match spawn_quiet(&mut command) {
            Some(child) => wait_with_deadline(child, self.step_timeout),
            None => false,
        }
    }
}

impl LinkControl for SystemLink {
    fn reset(&self, interface: &str) -> bool {
        let down = self.ip_link(interface, "down");
        // A settle pause between down and up; radios and switches drop
        // the port state asynchronously.
        std::thread::sleep(Duration::from_secs(2));
        let up = self.ip_link(interface, "up");
        let lease = self.renew_lease(interface);
        down && up && lease
    }

    fn ensure_up(&self, interface: &str) -> bool {
        self.ip_link(interface, "up")
    }
}

/// Notification gateway: pipes the rendered message to a configured
/// command, recipient address as the single argument.
#[derive(Debug, Clone)]
pub struct CommandTransport {
    pub command: String,
    pub address: String,
    pub timeout: Duration,
}

impl CommandTransport {
    #[must_use]
    pub fn new(command: String, address: String) -> Self {
        Self {
            command,
            address,
            timeout: Duration::from_secs(60),
        }
    }
}

impl Transport for CommandTransport {
    fn deliver(&self, text: &str) -> bool {
        let mut command = Command::new(&self.command);
        if !self.address.is_empty() {
            command.arg(&self.address);
        }
        let child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let Ok(mut child) = child else {
            return false;
        };
        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            if stdin.write_all(text.as_bytes()).is_err() {
                let _ = child.kill();
                let _ = child.wait();
                return false;
            }
        }
        wait_with_deadline(child, self.timeout)
    }
}

/// Real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::{wait_with_deadline, CommandTransport};
    use crate::platform::pal::Transport;
    use std::process::{Command, Stdio};
    use std::time::Duration;

    #[test]
    fn deadline_kills_overrunning_command() {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("sleep must spawn");
        let started = std::time::Instant::now();
        assert!(!wait_with_deadline(child, Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn successful_command_reports_true() {
        let child = Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("true must spawn");
        assert!(wait_with_deadline(child, Duration::from_secs(5)));
    }

    #[test]
    fn transport_pipes_body_to_command() {
        let transport = CommandTransport {
            command: "cat".to_string(),
            address: String::new(),
            timeout: Duration::from_secs(5),
        };
        assert!(transport.deliver("hello"));
    }

    #[test]
    fn transport_reports_missing_command() {
        let transport = CommandTransport::new("nwd-no-such-gateway".to_string(), String::new());
        assert!(!transport.deliver("hello"));
    }
}
