use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::raft::RaftNode;

pub struct HttpServer {
    addr: SocketAddr,
    node: Arc<RaftNode>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, node: Arc<RaftNode>) -> Self {
        Self { addr, node }
    }

    /// Bind and serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, node_id = %self.node.id, "Starting HTTP server");

        axum::serve(listener, super::router(self.node))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!(addr = %local, "HTTP server stopped");
        Ok(())
    }
}
