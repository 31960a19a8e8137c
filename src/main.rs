//! etcd-haproxy-sync - keeps haproxy in sync with etcd discovery
//!
//! Usage:
//! - `etcd-haproxy-sync --discovery-url https://discovery.etcd.io/<token>`
//! - `etcd-haproxy-sync --discovery-url <url> --poll-interval 30s`
//!
//! Exit code is 0 after SIGINT/SIGTERM, 1 on any error or if haproxy dies.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use etcd_haproxy_sync::config::env::constants::VERSION;
use etcd_haproxy_sync::domain::ExitOutcome;
use etcd_haproxy_sync::infra::{DiscoveryClient, HaproxyLauncher};
use etcd_haproxy_sync::services::{shutdown_signal, Supervisor};
use etcd_haproxy_sync::{Cli, SyncResult};

fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_level.into());

    // stdout belongs to haproxy
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> SyncResult<ExitOutcome> {
    let config = cli.into_config()?;
    let source = DiscoveryClient::new(config.discovery_url.clone())?;

    tracing::info!(
        version = VERSION,
        discovery_url = %source.url(),
        poll_interval = ?config.poll_interval,
        config_path = %config.config_path.display(),
        "Starting etcd-haproxy-sync"
    );

    let launcher = HaproxyLauncher::new(config.haproxy_bin.clone());

    let mut supervisor = Supervisor::new(config, source, launcher);
    supervisor.run(shutdown_signal()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match run(cli).await {
        // the supervisor already logged how haproxy ended
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!(error = %e, "etcd-haproxy-sync failed");
            ExitCode::FAILURE
        }
    }
}
