use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::client::{HttpPeerClient, PeerClient};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::http::HttpServer;
use crate::raft::{ElectionMonitor, RaftNode};
use crate::storage::{FileStore, MemoryStore, NodeStateStore};

/// Main node that wires the store, the election engine, the monitor and the
/// HTTP server together
pub struct Node {
    pub config: NodeConfig,
    pub raft_node: Arc<RaftNode>,
}

impl Node {
    /// Validate `config` and build a node with the production store and
    /// peer client: a [`FileStore`] when a data directory is configured,
    /// otherwise an in-memory store.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn NodeStateStore> = match &config.data_dir {
            Some(dir) => {
                let store = FileStore::open(dir).await?;
                for state in store.find_all().await? {
                    tracing::info!(
                        node_id = %state.node_id,
                        role = %state.role,
                        term = state.current_term,
                        stopped = state.stopped,
                        "Recovered node state"
                    );
                }
                Arc::new(store)
            }
            None => Arc::new(MemoryStore::new()),
        };
        let peers = Arc::new(HttpPeerClient::new(config.rpc_timeout())?);

        Ok(Self::with_parts(config, store, peers))
    }

    pub fn with_parts(
        config: NodeConfig,
        store: Arc<dyn NodeStateStore>,
        peers: Arc<dyn PeerClient>,
    ) -> Self {
        let raft_node = Arc::new(RaftNode::new(config.clone(), store, peers));
        Self { config, raft_node }
    }

    /// Run the node until `shutdown` is cancelled.
    ///
    /// 1. Binds the HTTP listener
    /// 2. Spawns the election monitor
    /// 3. Initializes the node if configured to do so
    /// 4. Serves HTTP (blocking)
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    /// Background tasks log their own errors.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.run_with_listener(listener, shutdown).await
    }

    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let monitor_node = self.raft_node.clone();
        let monitor_shutdown = shutdown.clone();
        let heartbeat_interval_ms = self.config.heartbeat_interval_ms;
        tokio::spawn(async move {
            ElectionMonitor::new(heartbeat_interval_ms)
                .run(monitor_node, monitor_shutdown)
                .await;
        });

        if self.config.auto_initialize {
            let node = self.raft_node.clone();
            tokio::spawn(async move {
                if let Err(e) = node.initialize().await {
                    tracing::error!(node_id = %node.id, error = %e, "Failed to initialize node");
                }
            });
        }

        let server = HttpServer::new(self.config.listen_addr, self.raft_node.clone());
        let result = server.serve(listener, shutdown).await;

        self.raft_node.shutdown();
        result
    }
}
