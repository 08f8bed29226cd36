use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::{Stream, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

use crate::client::{is_peer_down, PeerClient};
use crate::config::NodeConfig;
use crate::error::{QuorumError, Result};
use crate::raft::state::{NodeRole, NodeState, NodeStatus};
use crate::raft::transition::StateTransitions;

/// Collects the self-reported status of every configured cluster member.
///
/// The aggregate always has one entry per configured address, in
/// configuration order. Members that cannot be asked show up as DOWN at
/// term 0 instead of failing the whole query.
pub struct StatusAggregator {
    node_id: String,
    own_addr: String,
    cluster_nodes: Vec<String>,
    transitions: Arc<StateTransitions>,
    peers: Arc<dyn PeerClient>,
}

impl StatusAggregator {
    pub fn new(
        config: &NodeConfig,
        transitions: Arc<StateTransitions>,
        peers: Arc<dyn PeerClient>,
    ) -> Self {
        Self {
            node_id: config.node_id.clone(),
            own_addr: config.advertise_addr.clone(),
            cluster_nodes: config.cluster_nodes.clone(),
            transitions,
            peers,
        }
    }

    /// This node's record with the role reported as DOWN while stopped
    pub async fn get_node_status_entity(&self) -> Result<NodeState> {
        let mut state = self
            .transitions
            .find(&self.node_id)
            .await?
            .ok_or_else(|| QuorumError::NotInitialized(self.node_id.clone()))?;
        if state.stopped {
            state.role = NodeRole::Down;
        }
        Ok(state)
    }

    pub async fn local_status(&self) -> Result<NodeStatus> {
        let state = self.get_node_status_entity().await?;
        Ok(NodeStatus::from_state(&state, self.own_addr.clone()))
    }

    /// Ask one peer, falling back to a DOWN entry keyed by its address
    pub async fn peer_status(&self, addr: &str) -> NodeStatus {
        match self.peers.status(addr).await {
            Ok(mut status) => {
                status.address = addr.to_string();
                status
            }
            Err(e) => {
                if is_peer_down(&e) {
                    tracing::debug!(peer = %addr, error = %e, "Peer is down");
                } else {
                    tracing::warn!(peer = %addr, error = %e, "Status request failed");
                }
                NodeStatus::unreachable(addr, addr)
            }
        }
    }

    /// Statuses of every member except this node
    pub async fn peer_statuses(&self) -> Vec<NodeStatus> {
        let polls = self
            .cluster_nodes
            .iter()
            .filter(|addr| **addr != self.own_addr)
            .map(|addr| self.peer_status(addr));
        join_all(polls).await
    }

    pub async fn get_all_node_statuses(&self) -> Vec<NodeStatus> {
        let polls = self.cluster_nodes.iter().map(|addr| async move {
            if *addr == self.own_addr {
                match self.local_status().await {
                    Ok(status) => status,
                    Err(e) => {
                        if !matches!(e, QuorumError::NotInitialized(_)) {
                            tracing::error!(error = %e, "Error retrieving local state");
                        }
                        NodeStatus::unreachable(self.node_id.clone(), addr.clone())
                    }
                }
            } else {
                self.peer_status(addr).await
            }
        });
        join_all(polls).await
    }

    /// Fresh aggregate every `period` for as long as the stream is polled.
    /// Dropping the stream is the only way to stop it.
    pub fn stream_statuses(
        self: Arc<Self>,
        period: Duration,
    ) -> impl Stream<Item = Vec<NodeStatus>> + Send + 'static {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        IntervalStream::new(interval).then(move |_| {
            let aggregator = self.clone();
            async move { aggregator.get_all_node_statuses().await }
        })
    }
}
