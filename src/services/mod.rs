//! Service layer
//!
//! Rendering, reconciliation and haproxy supervision

pub mod reconcile;
pub mod render;
pub mod supervisor;

pub use reconcile::{Reconciler, Reconciliation};
pub use render::render;
pub use supervisor::{shutdown_signal, Supervisor};
