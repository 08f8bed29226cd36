use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{QuorumError, Result};
use crate::storage::is_valid_record_name;

/// Configuration for a single cluster member.
///
/// `cluster_nodes` lists every member's network address, this node's own
/// `advertise_addr` included. Its length is the static cluster size used for
/// majority counting.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub listen_addr: SocketAddr,
    /// Address under which peers reach this node (host:port, no scheme)
    pub advertise_addr: String,
    pub cluster_nodes: Vec<String>,
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Upper bound for any single outbound peer call
    pub rpc_timeout_ms: u64,
    pub readiness_interval_ms: u64,
    pub status_stream_interval_ms: u64,
    /// When set, node state is persisted as JSON files in this directory
    pub data_dir: Option<PathBuf>,
    /// Run `initialize` as soon as the node has started
    pub auto_initialize: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "node1".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            advertise_addr: "localhost:8000".to_string(),
            cluster_nodes: vec!["localhost:8000".to_string()],
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
            rpc_timeout_ms: 200,
            readiness_interval_ms: 5000,
            status_stream_interval_ms: 500,
            data_dir: None,
            auto_initialize: false,
        }
    }
}

impl NodeConfig {
    /// Config for `node_id` listening on `listen_addr`, advertised as
    /// `localhost:<port>` and initially alone in its cluster.
    pub fn new(node_id: impl Into<String>, listen_addr: SocketAddr) -> Self {
        let advertise_addr = format!("localhost:{}", listen_addr.port());
        Self {
            node_id: node_id.into(),
            listen_addr,
            cluster_nodes: vec![advertise_addr.clone()],
            advertise_addr,
            ..Default::default()
        }
    }

    pub fn with_advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.advertise_addr = addr.into();
        self
    }

    pub fn with_cluster_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cluster_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_election_timeout(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min_ms = min_ms;
        self.election_timeout_max_ms = max_ms;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }

    /// Reject configurations the node cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(QuorumError::Config("node id must not be empty".to_string()));
        }
        if self.data_dir.is_some() && !is_valid_record_name(&self.node_id) {
            return Err(QuorumError::Config(format!(
                "node id {:?} cannot be stored on disk, use only letters, digits, '.', '-' and '_'",
                self.node_id
            )));
        }
        if self.cluster_nodes.is_empty() {
            return Err(QuorumError::Config(
                "cluster nodes must be configured".to_string(),
            ));
        }
        if !self.cluster_nodes.iter().any(|n| n == &self.advertise_addr) {
            return Err(QuorumError::Config(format!(
                "own address {} is not part of the cluster nodes [{}]",
                self.advertise_addr,
                self.cluster_nodes.join(", ")
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.cluster_nodes.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(QuorumError::Config(format!(
                "cluster node {} is listed more than once",
                dup
            )));
        }
        if self.election_timeout_min_ms == 0
            || self.election_timeout_min_ms > self.election_timeout_max_ms
        {
            return Err(QuorumError::Config(format!(
                "invalid election timeout bounds {}..={} ms",
                self.election_timeout_min_ms, self.election_timeout_max_ms
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(QuorumError::Config(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        if self.rpc_timeout_ms == 0
            || self.readiness_interval_ms == 0
            || self.status_stream_interval_ms == 0
        {
            return Err(QuorumError::Config(
                "rpc timeout and polling intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of voting members, self included.
    pub fn cluster_size(&self) -> usize {
        self.cluster_nodes.len()
    }

    /// Smallest vote count that is more than half of the cluster.
    pub fn majority(&self) -> usize {
        self.cluster_size() / 2 + 1
    }

    /// Every configured address except our own.
    pub fn peer_addrs(&self) -> Vec<String> {
        self.cluster_nodes
            .iter()
            .filter(|addr| !self.is_self(addr))
            .cloned()
            .collect()
    }

    pub fn is_self(&self, addr: &str) -> bool {
        addr == self.advertise_addr
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn status_stream_interval(&self) -> Duration {
        Duration::from_millis(self.status_stream_interval_ms)
    }
}

/// Split a comma-separated address list, dropping blanks.
pub fn parse_cluster_nodes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
