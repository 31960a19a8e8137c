//! Runtime state module
//!
//! Owns the applied haproxy config on disk

pub mod applied_config;

pub use applied_config::AppliedConfig;
