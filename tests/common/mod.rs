//! Shared harness for CLI smoke tests: runs the built `nwd` binary and
//! records the full output so a failing assertion can point somewhere
//! useful.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

pub struct CliResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CliResult {
    let output = Command::new(env!("CARGO_BIN_EXE_nwd"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("nwd binary must spawn");
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let log_dir = std::env::temp_dir().join("nwd-cli-tests");
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join(format!("{case_name}.log"));
    let _ = std::fs::write(
        &log_path,
        format!(
            "args: {args:?}\nstatus: {:?}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
            output.status
        ),
    );

    CliResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Write a config whose every path points under `dir`, so a test never
/// touches system state.
pub fn write_scratch_config(dir: &Path) -> PathBuf {
    let body = format!(
        r#"[network]
router_address = "127.0.0.1"
dns_anchors = ["127.0.0.1"]
interface = "lo"

[probe]
count = 1
timeout_secs = 1

[paths]
state_dir = "{state}"
log_dir = "{logs}"
lock_file = "{lock}"
"#,
        state = dir.join("state").display(),
        logs = dir.join("logs").display(),
        lock = dir.join("nwd.lock").display(),
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, body).expect("write scratch config");
    path
}
