//! Reconciliation: resolve, render, compare, write

use std::path::Path;

use tracing::{debug, info};

use crate::domain::Host;
use crate::error::SyncResult;
use crate::infra::MembershipSource;
use crate::services::render::render;
use crate::state::AppliedConfig;

/// Result of one reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// A new config was written; haproxy must be reloaded
    Applied { hosts: usize },
    /// Nothing to do
    Unchanged,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        matches!(self, Reconciliation::Applied { .. })
    }
}

/// Keeps the applied config in line with discovery membership
pub struct Reconciler<S> {
    source: S,
    store: AppliedConfig,
    ports: Vec<u16>,
    /// Sorted membership behind the config currently on disk
    applied_membership: Option<Vec<Host>>,
}

impl<S: MembershipSource> Reconciler<S> {
    pub fn new(source: S, store: AppliedConfig, ports: Vec<u16>) -> Self {
        Self {
            source,
            store,
            ports,
            applied_membership: None,
        }
    }

    pub fn config_path(&self) -> &Path {
        self.store.path()
    }

    /// Run one cycle
    ///
    /// Membership is compared order-independently: if discovery returns the
    /// same hosts in a different order, nothing is written. Otherwise the new
    /// render is compared byte for byte with the file and written only when it
    /// differs. A missing file always differs.
    pub async fn reconcile(&mut self) -> SyncResult<Reconciliation> {
        let hosts = self.source.resolve().await?;
        let membership = hosts.membership();

        if self.applied_membership.as_ref() == Some(&membership) {
            debug!(host_count = hosts.len(), "Membership unchanged");
            return Ok(Reconciliation::Unchanged);
        }

        let rendered = render(&hosts, &self.ports);
        let current = self.store.read().await?;

        if current.as_deref() == Some(rendered.as_slice()) {
            debug!(
                path = %self.store.path().display(),
                "Rendered config matches applied config"
            );
            self.applied_membership = Some(membership);
            return Ok(Reconciliation::Unchanged);
        }

        self.store.write(&rendered).await?;
        self.applied_membership = Some(membership);

        info!(
            path = %self.store.path().display(),
            host_count = hosts.len(),
            first_run = current.is_none(),
            "Applied new haproxy config"
        );
        Ok(Reconciliation::Applied { hosts: hosts.len() })
    }
}
