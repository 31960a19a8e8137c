//! Infrastructure module
//!
//! Wraps external dependencies (discovery HTTP client, haproxy process control)

pub mod discovery;
pub mod process;

pub use discovery::{DiscoveryClient, MembershipSource};
pub use process::{HaproxyLauncher, HaproxyProcess, ManagedProcess, ProcessLauncher};
