//! Discovery membership model
//!
//! Pure data types, no tokio/reqwest dependency

use std::fmt;

use serde::Deserialize;

/// Scheme every published peer URL starts with
pub const PEER_URL_SCHEME: &str = "http://";
/// Peer port appended to every published peer URL
pub const PEER_URL_PORT_SUFFIX: &str = ":7001";

/// Discovery directory listing, e.g. `GET /v2/keys/_etcd/registry/<token>`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub node: Node,
}

/// A key or directory node
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub dir: bool,
}

impl DiscoveryResponse {
    /// Hosts published under the directory node, in response order
    pub fn hosts(&self) -> HostSet {
        self.node
            .nodes
            .iter()
            .map(|n| Host::from_peer_url(&n.value))
            .collect()
    }
}

/// A single backend address (hostname or IP)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Host(String);

impl Host {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    /// Strip the peer URL decoration textually: `http://10.0.0.1:7001` -> `10.0.0.1`
    pub fn from_peer_url(value: &str) -> Self {
        let host = value.strip_prefix(PEER_URL_SCHEME).unwrap_or(value);
        let host = host.strip_suffix(PEER_URL_PORT_SUFFIX).unwrap_or(host);
        Self(host.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hosts from one resolution, in discovery order
///
/// The order drives the `server-<n>` labels in the rendered config. Use
/// [`HostSet::membership`] for order-independent comparison.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostSet(Vec<Host>);

impl HostSet {
    pub fn new(hosts: Vec<Host>) -> Self {
        Self(hosts)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Host> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted copy of the hosts
    pub fn membership(&self) -> Vec<Host> {
        let mut sorted = self.0.clone();
        sorted.sort();
        sorted
    }
}

impl FromIterator<Host> for HostSet {
    fn from_iter<I: IntoIterator<Item = Host>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a HostSet {
    type Item = &'a Host;
    type IntoIter = std::slice::Iter<'a, Host>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<S: Into<String>> From<Vec<S>> for HostSet {
    fn from(hosts: Vec<S>) -> Self {
        hosts.into_iter().map(Host::new).collect()
    }
}
