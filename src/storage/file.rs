use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use super::NodeStateStore;
use crate::error::{QuorumError, Result};
use crate::raft::state::NodeState;

/// One JSON document per node under a data directory.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// record, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) the data directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "Opened node state directory");
        Ok(Self { dir })
    }

    fn record_path(&self, node_id: &str) -> Result<PathBuf> {
        if !is_valid_record_name(node_id) {
            return Err(QuorumError::Storage(format!(
                "node id {:?} cannot be used as a file name",
                node_id
            )));
        }
        Ok(self.dir.join(format!("{}.json", node_id)))
    }
}

/// Whether `node_id` can be used verbatim as a record file name
pub fn is_valid_record_name(node_id: &str) -> bool {
    !node_id.is_empty()
        && node_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && node_id != "."
        && node_id != ".."
}

#[async_trait]
impl NodeStateStore for FileStore {
    async fn find(&self, node_id: &str) -> Result<Option<NodeState>> {
        let path = self.record_path(node_id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, state: &NodeState) -> Result<()> {
        let path = self.record_path(&state.node_id)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state)?;

        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<NodeState>> {
        let mut states = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<NodeState>(&bytes) {
                Ok(state) => states.push(state),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable node state file");
                }
            }
        }

        states.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(states)
    }
}
