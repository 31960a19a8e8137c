//! Command line / environment configuration loading

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{SyncError, SyncResult};

/// Command line flags, each with an environment fallback
#[derive(Debug, Parser)]
#[command(name = "etcd-haproxy-sync")]
#[command(about = "Keeps haproxy in sync with etcd discovery membership", long_about = None)]
#[command(version)]
pub struct Cli {
    /// The etcd discovery url
    #[arg(long, env = "DISCOVERY_URL", default_value = "")]
    pub discovery_url: String,

    /// How often to check etcd for updates (e.g. 30s, 5m, 1h)
    #[arg(long, env = "POLL_INTERVAL", default_value = "5m", value_parser = parse_duration)]
    pub poll_interval: Duration,

    /// Where the rendered haproxy config is written
    #[arg(long, env = "HAPROXY_CONFIG_PATH", default_value = constants::CONFIG_PATH)]
    pub config_path: PathBuf,

    /// haproxy executable
    #[arg(long, env = "HAPROXY_BIN", default_value = constants::HAPROXY_BIN)]
    pub haproxy_bin: String,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    /// Build the runtime configuration
    pub fn into_config(self) -> SyncResult<SyncConfig> {
        let config = SyncConfig {
            discovery_url: self.discovery_url.trim().to_string(),
            poll_interval: self.poll_interval,
            config_path: self.config_path,
            haproxy_bin: self.haproxy_bin,
            ports: constants::LISTENER_PORTS.to_vec(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Runtime configuration, built once at startup and owned by the supervisor
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Discovery directory URL
    pub discovery_url: String,
    /// Reconciliation period
    pub poll_interval: Duration,
    /// Applied haproxy config file
    pub config_path: PathBuf,
    pub haproxy_bin: String,
    /// Listener ports, one `listen` stanza each
    pub ports: Vec<u16>,
}

impl SyncConfig {
    /// Configuration with every optional setting at its default
    pub fn new(discovery_url: impl Into<String>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            poll_interval: constants::DEFAULT_POLL_INTERVAL,
            config_path: PathBuf::from(constants::CONFIG_PATH),
            haproxy_bin: constants::HAPROXY_BIN.to_string(),
            ports: constants::LISTENER_PORTS.to_vec(),
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.discovery_url.is_empty() {
            return Err(SyncError::Config(
                "discovery url is required (--discovery-url or DISCOVERY_URL)".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SyncError::Config("poll interval must be positive".to_string()));
        }
        if self.haproxy_bin.is_empty() {
            return Err(SyncError::Config("haproxy binary must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Parse `300`, `300s`, `5m`, `1h` or `500ms`
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);

    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;

    let duration = match unit {
        "" | "s" => Duration::from_secs(amount),
        "ms" => Duration::from_millis(amount),
        "m" => Duration::from_secs(amount.saturating_mul(60)),
        "h" => Duration::from_secs(amount.saturating_mul(3600)),
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, value)),
    };

    if duration.is_zero() {
        return Err("duration must be positive".to_string());
    }
    Ok(duration)
}

/// Constants
pub mod constants {
    use std::time::Duration;

    /// Ports load balanced across every discovered host: etcd peer, client, legacy client
    pub const LISTENER_PORTS: [u16; 3] = [2380, 2379, 4001];

    pub const CONFIG_PATH: &str = "/haproxy.cfg";

    pub const HAPROXY_BIN: &str = "haproxy";

    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Version
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
