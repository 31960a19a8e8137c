//! Configuration module
//!
//! Flag/environment parsing and the runtime configuration struct

pub mod env;

pub use env::{Cli, SyncConfig};
