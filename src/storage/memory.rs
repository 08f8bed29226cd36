use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::NodeStateStore;
use crate::error::Result;
use crate::raft::state::NodeState;

/// Process-local store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, NodeState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStateStore for MemoryStore {
    async fn find(&self, node_id: &str) -> Result<Option<NodeState>> {
        Ok(self.records.read().await.get(node_id).cloned())
    }

    async fn save(&self, state: &NodeState) -> Result<()> {
        self.records
            .write()
            .await
            .insert(state.node_id.clone(), state.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<NodeState>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
