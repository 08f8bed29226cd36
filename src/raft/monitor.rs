use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::raft::node::RaftNode;

/// Drives failure detection: every interval it runs one
/// [`RaftNode::tick`] as its own task, so a slow election never delays the
/// next round of heartbeats.
pub struct ElectionMonitor {
    interval: Duration,
}

impl ElectionMonitor {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, node: Arc<RaftNode>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(node_id = %node.id, "Election monitor stopped");
                    break;
                }
                _ = interval.tick() => {
                    let node = node.clone();
                    tokio::spawn(async move {
                        if let Err(e) = node.tick().await {
                            tracing::warn!(node_id = %node.id, error = %e, "Election monitor tick failed");
                        }
                    });
                }
            }
        }
    }
}
