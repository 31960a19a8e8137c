//! Domain model
//!
//! Plain data structures, no tokio/reqwest dependency

pub mod discovery;
pub mod supervisor;

pub use discovery::{DiscoveryResponse, Host, HostSet, Node};
pub use supervisor::{ExitOutcome, SupervisorState};
