//! etcd-haproxy-sync
//!
//! Keeps an haproxy config in line with the hosts published through etcd
//! discovery and supervises the haproxy process across reloads.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

pub use config::{Cli, SyncConfig};
pub use error::{SyncError, SyncResult};
