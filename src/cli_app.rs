//! Top-level CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{CommandFactory as _, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize as _;

use crate::core::config::Config;
use crate::core::errors::{Result, WatchdogError};
use crate::notify::queue::MessageQueue;
use crate::platform::pal::{ProbeSpec, Prober as _};
use crate::platform::system::PingProber;
use crate::store::{
    decode_timestamp, FileStore, StateStore as _, KEY_HEARTBEAT, KEY_LAST_RESET, KEY_LAST_START,
    KEY_QUEUE,
};

/// Default config location when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "/etc/nwd/config.toml";

/// Connectivity watchdog — keeps a flaky uplink alive and tells you when it could not.
#[derive(Parser)]
#[command(name = "nwd", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the watchdog in the foreground (used by the service manager).
    Daemon,
    /// One-shot reachability report; takes no recovery actions.
    Check,
    /// Show persisted daemon state.
    Status {
        /// Emit machine-readable JSON instead of the human view.
        #[arg(long)]
        json: bool,
    },
    /// Show or locate the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the configuration file path in use.
    Path,
}

/// Resolve the configuration: an explicit `--config` must exist; the
/// default path falls back to built-in defaults when absent. Either way
/// the result is validated, and validation failures are fatal.
fn load_config(flag: Option<&Path>) -> Result<Config> {
    let config = match flag {
        Some(path) => Config::load(path)?,
        None => match Config::load(Path::new(DEFAULT_CONFIG_PATH)) {
            Ok(config) => config,
            Err(WatchdogError::MissingConfig { .. }) => Config::default(),
            Err(error) => return Err(error),
        },
    };
    config.validate()?;
    Ok(config)
}

fn resolved_config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "nwd", &mut std::io::stdout());
            Ok(())
        }
        Command::Config(ConfigCommand::Path) => {
            println!("{}", resolved_config_path(cli).display());
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let config = load_config(cli.config.as_deref())?;
            let rendered =
                toml::to_string_pretty(&config).map_err(|e| WatchdogError::Serialization {
                    context: "toml",
                    details: e.to_string(),
                })?;
            print!("{rendered}");
            Ok(())
        }
        Command::Check => {
            let config = load_config(cli.config.as_deref())?;
            check(&config);
            Ok(())
        }
        Command::Status { json } => {
            let config = load_config(cli.config.as_deref())?;
            status(&config, *json)
        }
        Command::Daemon => {
            let config = load_config(cli.config.as_deref())?;
            crate::daemon::loop_main::run(&config)
        }
    }
}

fn probe_line(config: &Config, address: &str) -> bool {
    let result = PingProber.probe(&ProbeSpec {
        address,
        count: config.probe.count,
        timeout: Duration::from_secs(config.probe.timeout_secs),
        payload_bytes: config.probe.payload_bytes,
    });
    let verdict = if result.reachable {
        "reachable".green().bold()
    } else {
        "unreachable".red().bold()
    };
    let latency = result
        .latency
        .map_or(String::new(), |l| format!(" ({} ms)", l.as_millis()));
    println!("  {address:<24} {verdict}{latency}");
    result.reachable
}

fn check(config: &Config) {
    println!("{}", "gateway".bold());
    let router = probe_line(config, &config.network.router_address);
    println!("{}", "dns anchors".bold());
    let mut internet = false;
    for anchor in &config.network.dns_anchors {
        internet |= probe_line(config, anchor);
    }
    let summary = match (router, internet) {
        (true, true) => "connectivity ok".green(),
        (true, false) => "gateway up, internet unreachable".yellow(),
        (false, _) => "gateway unreachable".red(),
    };
    println!("{summary}");
}

fn status(config: &Config, json: bool) -> Result<()> {
    let store = FileStore::open(&config.paths.state_dir)?;
    let read_ts = |key: &str| {
        store
            .read(key)
            .ok()
            .flatten()
            .and_then(|raw| decode_timestamp(key, &raw).ok())
    };
    let heartbeat = read_ts(KEY_HEARTBEAT);
    let last_reset = read_ts(KEY_LAST_RESET);
    let last_start = read_ts(KEY_LAST_START);
    let queued = store
        .read(KEY_QUEUE)
        .ok()
        .flatten()
        .and_then(|raw| MessageQueue::from_json(&raw).ok())
        .map_or(0, |queue| queue.len());
    let daemon_running =
        match crate::daemon::lock::SingletonLock::acquire(&config.paths.lock_file) {
            Ok(lock) => {
                lock.release();
                false
            }
            Err(WatchdogError::AlreadyRunning { .. }) => true,
            Err(error) => return Err(error),
        };

    if json {
        let payload = serde_json::json!({
            "daemon_running": daemon_running,
            "last_beat": heartbeat.map(|t| t.to_rfc3339()),
            "last_reset": last_reset.map(|t| t.to_rfc3339()),
            "last_start": last_start.map(|t| t.to_rfc3339()),
            "queued_messages": queued,
        });
        println!("{payload}");
        return Ok(());
    }

    let running = if daemon_running {
        "running".green().bold()
    } else {
        "stopped".red().bold()
    };
    let render = |ts: Option<DateTime<Utc>>| ts.map_or("never".to_string(), |t| t.to_rfc3339());
    println!("daemon:          {running}");
    println!("last beat:       {}", render(heartbeat));
    println!("last reset:      {}", render(last_reset));
    println!("last start:      {}", render(last_start));
    println!("queued messages: {queued}");
    Ok(())
}
