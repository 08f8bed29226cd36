//! Outbound calls to peer nodes.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{QuorumError, Result};
use crate::raft::rpc::{HeartbeatRequest, VoteRequest};
use crate::raft::state::NodeStatus;

/// RPC client used by the election engine and the status aggregator.
///
/// Addresses are `host:port` strings exactly as configured in the cluster
/// node list. Implementations must bound every call in time; callers treat
/// any error as "peer down".
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn request_vote(&self, addr: &str, req: &VoteRequest) -> Result<bool>;

    async fn heartbeat(&self, addr: &str, req: &HeartbeatRequest) -> Result<()>;

    async fn status(&self, addr: &str) -> Result<NodeStatus>;
}

/// JSON-over-HTTP client talking to the `/raft` routes of peer nodes
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    fn url(addr: &str, path: &str) -> String {
        if addr.starts_with("http://") || addr.starts_with("https://") {
            format!("{}/raft/{}", addr.trim_end_matches('/'), path)
        } else {
            format!("http://{}/raft/{}", addr, path)
        }
    }

    fn unreachable(addr: &str, err: reqwest::Error) -> QuorumError {
        QuorumError::PeerUnreachable {
            addr: addr.to_string(),
            reason: describe(&err),
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn request_vote(&self, addr: &str, req: &VoteRequest) -> Result<bool> {
        let resp = self
            .http
            .post(Self::url(addr, "request-vote"))
            .json(req)
            .send()
            .await
            .map_err(|e| Self::unreachable(addr, e))?
            .error_for_status()?;
        Ok(resp.json::<bool>().await?)
    }

    async fn heartbeat(&self, addr: &str, req: &HeartbeatRequest) -> Result<()> {
        self.http
            .post(Self::url(addr, "heartbeat"))
            .json(req)
            .send()
            .await
            .map_err(|e| Self::unreachable(addr, e))?
            .error_for_status()?;
        Ok(())
    }

    async fn status(&self, addr: &str) -> Result<NodeStatus> {
        let resp = self
            .http
            .get(Self::url(addr, "status"))
            .send()
            .await
            .map_err(|e| Self::unreachable(addr, e))?
            .error_for_status()?;
        Ok(resp.json::<NodeStatus>().await?)
    }
}

/// Whether an error only says the peer is not taking part (refused
/// connection, timeout, or not initialized yet), as opposed to a peer that
/// answered with something unexpected.
pub fn is_peer_down(err: &QuorumError) -> bool {
    match err {
        QuorumError::PeerUnreachable { .. } => true,
        QuorumError::Http(e) => {
            e.is_connect() || e.is_timeout() || e.status() == Some(reqwest::StatusCode::NOT_FOUND)
        }
        _ => false,
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return "timed out".to_string();
    }
    match err.source() {
        Some(source) => format!("{} ({})", err, source),
        None => err.to_string(),
    }
}
