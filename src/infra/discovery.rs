//! Discovery service HTTP client
//!
//! Reads the membership directory published through the etcd discovery protocol

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::domain::{DiscoveryResponse, HostSet};
use crate::error::{SyncError, SyncResult};

/// Source of the current backend membership
#[async_trait]
pub trait MembershipSource: Send + Sync {
    /// Resolve the current hosts, in the order the source reports them
    async fn resolve(&self) -> SyncResult<HostSet>;
}

/// Discovery directory client
///
/// No retry and no request timeout: a failed fetch fails the current
/// reconciliation and the caller decides what happens next.
#[derive(Clone)]
pub struct DiscoveryClient {
    client: Client,
    url: String,
}

impl DiscoveryClient {
    pub fn new(url: impl Into<String>) -> SyncResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MembershipSource for DiscoveryClient {
    async fn resolve(&self) -> SyncResult<HostSet> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        let listing: DiscoveryResponse =
            serde_json::from_slice(&body).map_err(|source| SyncError::DiscoveryDecode {
                status: status.as_u16(),
                source,
            })?;

        let hosts = listing.hosts();
        debug!(url = %self.url, host_count = hosts.len(), "Resolved discovery membership");
        Ok(hosts)
    }
}
