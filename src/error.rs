//! Unified error handling
//!
//! Every fallible operation in the agent returns [`SyncError`]. The variants
//! follow the failure categories of one reconciliation cycle: discovery,
//! applied-config IO, haproxy process control and invalid configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Agent error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure talking to the discovery service
    #[error("Discovery request failed: {0}")]
    DiscoveryTransport(#[from] reqwest::Error),

    /// Discovery body was not a directory node listing
    #[error("Failed to decode discovery response (HTTP {status}): {source}")]
    DiscoveryDecode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send {signal} to haproxy (pid {pid}): {source}")]
    Signal {
        pid: u32,
        signal: &'static str,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("Failed to stop haproxy: {0}")]
    Terminate(#[source] std::io::Error),

    #[error("Failed to wait for haproxy: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias
pub type SyncResult<T> = Result<T, SyncError>;
