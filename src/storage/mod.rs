//! Persistence of per-node election state.
//!
//! A store keeps one [`NodeState`] record per node identifier. Records are
//! always replaced whole, so a reader sees either the previous or the new
//! record and never a mix of both. Serializing concurrent read-modify-write
//! cycles is the job of [`crate::raft::transition::StateTransitions`], not of
//! the store.

mod file;
mod memory;

pub use file::{is_valid_record_name, FileStore};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::raft::state::NodeState;

#[async_trait]
pub trait NodeStateStore: Send + Sync {
    /// Load the record for `node_id`, `None` if it was never saved
    async fn find(&self, node_id: &str) -> Result<Option<NodeState>>;

    /// Insert or replace the record keyed by `state.node_id`
    async fn save(&self, state: &NodeState) -> Result<()>;

    /// Every stored record, ordered by node id
    async fn find_all(&self) -> Result<Vec<NodeState>>;
}
