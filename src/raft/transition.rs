use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{QuorumError, Result};
use crate::raft::state::{NodeRole, NodeState};
use crate::storage::NodeStateStore;

/// Serialized, all-or-nothing mutations of persisted node state.
///
/// Every write goes through a single writer lock: a read-modify-write cycle
/// (load, decide, save) runs to completion before the next one loads. The
/// store replaces records whole, so concurrent readers never see a partial
/// update either.
pub struct StateTransitions {
    store: Arc<dyn NodeStateStore>,
    writer: Mutex<()>,
}

impl StateTransitions {
    pub fn new(store: Arc<dyn NodeStateStore>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
        }
    }

    /// Current persisted record, without taking the writer lock
    pub async fn find(&self, node_id: &str) -> Result<Option<NodeState>> {
        self.store.find(node_id).await
    }

    /// Run `f` against the stored record under the writer lock and persist
    /// the result if `f` changed it. `f` may create the record by filling the
    /// `None`; removing a record is not supported and is ignored.
    pub async fn update<T, F>(&self, node_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Option<NodeState>) -> T + Send,
        T: Send,
    {
        let _guard = self.writer.lock().await;
        let original = self.store.find(node_id).await?;
        let mut record = original.clone();

        let output = f(&mut record);

        if record != original {
            if let Some(state) = &record {
                if state.node_id != node_id {
                    return Err(QuorumError::Internal(format!(
                        "update of {} produced a record for {}",
                        node_id, state.node_id
                    )));
                }
                self.store.save(state).await?;
            }
        }
        Ok(output)
    }

    /// Persist `state` as is
    pub async fn save_node_state(&self, state: NodeState) -> Result<NodeState> {
        let _guard = self.writer.lock().await;
        self.store.save(&state).await?;
        Ok(state)
    }

    /// Force the stored record of `state.node_id` to FOLLOWER.
    ///
    /// Works on the canonical stored record, so a term adopted concurrently is
    /// kept; `state` is only used when nothing has been stored yet.
    pub async fn step_down(&self, state: &NodeState) -> Result<NodeState> {
        let stepped = self
            .update(&state.node_id, |record| {
                let current = record.get_or_insert_with(|| state.clone());
                let previous = current.role;
                current.become_follower();
                (previous, current.clone())
            })
            .await?;

        let (previous, stepped) = stepped;
        if previous != NodeRole::Follower {
            tracing::info!(
                node_id = %stepped.node_id,
                term = stepped.current_term,
                from = %previous,
                "Stepped down to follower"
            );
        }
        Ok(stepped)
    }

    /// Promote the stored record of `state.node_id` to LEADER.
    ///
    /// The promotion only happens if the stored term still equals
    /// `state.current_term` and the node is not stopped; otherwise the stored
    /// record is returned unchanged and the caller sees a non-leader role.
    pub async fn become_leader(&self, state: &NodeState) -> Result<NodeState> {
        let term = state.current_term;
        let promoted = self
            .update(&state.node_id, |record| {
                record.as_mut().map(|current| {
                    if current.current_term == term && !current.stopped {
                        current.role = NodeRole::Leader;
                    }
                    current.clone()
                })
            })
            .await?;

        match promoted {
            Some(leader) => {
                if leader.is_leader() {
                    tracing::info!(node_id = %leader.node_id, term, "Became leader");
                }
                Ok(leader)
            }
            None => Err(QuorumError::NotInitialized(state.node_id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn transitions() -> StateTransitions {
        StateTransitions::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_save_node_state_returns_persisted_record() {
        let tx = transitions();
        let mut state = NodeState::new("node1");
        state.current_term = 1;

        let saved = tx.save_node_state(state.clone()).await.unwrap();
        assert_eq!(saved, state);
        assert_eq!(tx.find("node1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_step_down_forces_follower() {
        let tx = transitions();
        let mut state = NodeState::new("node1");
        state.role = NodeRole::Leader;
        state.current_term = 2;
        tx.save_node_state(state.clone()).await.unwrap();

        let stepped = tx.step_down(&state).await.unwrap();
        assert_eq!(stepped.role, NodeRole::Follower);
        assert_eq!(stepped.current_term, 2);
        assert_eq!(tx.find("node1").await.unwrap().unwrap().role, NodeRole::Follower);
    }

    #[tokio::test]
    async fn test_step_down_keeps_newer_stored_term() {
        let tx = transitions();
        let mut stale = NodeState::new("node1");
        stale.role = NodeRole::Leader;
        stale.current_term = 2;

        let mut stored = stale.clone();
        stored.current_term = 6;
        tx.save_node_state(stored).await.unwrap();

        let stepped = tx.step_down(&stale).await.unwrap();
        assert_eq!(stepped.current_term, 6);
    }

    #[tokio::test]
    async fn test_become_leader_for_matching_term() {
        let tx = transitions();
        let mut state = NodeState::new("node1");
        state.become_candidate();
        tx.save_node_state(state.clone()).await.unwrap();

        let leader = tx.become_leader(&state).await.unwrap();
        assert_eq!(leader.role, NodeRole::Leader);
        assert_eq!(leader.current_term, 1);
    }

    #[tokio::test]
    async fn test_become_leader_refused_after_term_moved_on() {
        let tx = transitions();
        let mut state = NodeState::new("node1");
        state.become_candidate();

        let mut newer = state.clone();
        newer.advance_term(3);
        newer.become_follower();
        tx.save_node_state(newer).await.unwrap();

        let result = tx.become_leader(&state).await.unwrap();
        assert_eq!(result.role, NodeRole::Follower);
        assert_eq!(result.current_term, 3);
    }

    #[tokio::test]
    async fn test_become_leader_refused_when_stopped() {
        let tx = transitions();
        let mut state = NodeState::new("node1");
        state.become_candidate();
        let mut stopped = state.clone();
        stopped.stop();
        tx.save_node_state(stopped).await.unwrap();

        let result = tx.become_leader(&state).await.unwrap();
        assert!(!result.is_leader());
        assert_eq!(result.role, NodeRole::Down);
    }

    #[tokio::test]
    async fn test_become_leader_without_record_is_not_initialized() {
        let tx = transitions();
        let result = tx.become_leader(&NodeState::new("ghost")).await;
        assert!(matches!(result, Err(QuorumError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_update_creates_and_skips_unchanged() {
        let tx = transitions();

        let created = tx
            .update("node1", |record| {
                record.get_or_insert_with(|| NodeState::new("node1")).clone()
            })
            .await
            .unwrap();
        assert_eq!(created.current_term, 0);

        let untouched = tx.update("node2", |record| record.is_some()).await.unwrap();
        assert!(!untouched);
        assert!(tx.find("node2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let tx = Arc::new(transitions());
        tx.save_node_state(NodeState::new("node1")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                tx.update("node1", |record| {
                    if let Some(state) = record.as_mut() {
                        state.current_term += 1;
                    }
                })
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tx.find("node1").await.unwrap().unwrap().current_term, 50);
    }
}
