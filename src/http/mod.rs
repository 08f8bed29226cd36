//! HTTP surface of a node: peer RPCs, operator controls and status queries,
//! all under `/raft`.

mod server;

pub use server::HttpServer;

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use crate::error::{QuorumError, Result};
use crate::raft::{HeartbeatRequest, RaftNode, VoteRequest, VoteRequestPayload};

/// Build the `/raft` router for one node
pub fn router(node: Arc<RaftNode>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let raft = Router::new()
        .route("/start-election", post(start_election_handler))
        .route("/request-vote", post(request_vote_handler))
        .route("/initialize", post(initialize_handler))
        .route("/heartbeat", post(heartbeat_handler))
        .route("/stop", get(stop_handler))
        .route("/resume", get(resume_handler))
        .route("/status", get(status_handler))
        .route("/cluster", get(cluster_handler))
        .route("/runtime", get(runtime_handler))
        .route("/status-stream", get(status_stream_handler));

    Router::new()
        .nest("/raft", raft)
        .layer(cors)
        .with_state(node)
}

async fn start_election_handler(State(node): State<Arc<RaftNode>>) -> Result<StatusCode> {
    let outcome = node.start_election().await?;
    tracing::debug!(node_id = %node.id, ?outcome, "Election requested over HTTP");
    Ok(StatusCode::OK)
}

async fn request_vote_handler(
    State(node): State<Arc<RaftNode>>,
    payload: std::result::Result<Json<VoteRequestPayload>, JsonRejection>,
) -> Result<Json<bool>> {
    let Json(payload) = payload.map_err(|e| QuorumError::InvalidRequest(e.body_text()))?;
    let req = VoteRequest::try_from(payload)?;
    Ok(Json(node.request_vote(&req).await?))
}

async fn initialize_handler(State(node): State<Arc<RaftNode>>) -> Result<StatusCode> {
    node.initialize().await?;
    Ok(StatusCode::OK)
}

async fn heartbeat_handler(State(node): State<Arc<RaftNode>>, body: Bytes) -> Result<StatusCode> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        HeartbeatRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| QuorumError::InvalidRequest(format!("invalid heartbeat body: {}", e)))?
    };
    node.receive_heartbeat(&req).await?;
    Ok(StatusCode::OK)
}

async fn stop_handler(State(node): State<Arc<RaftNode>>) -> Result<&'static str> {
    node.stop_node().await?;
    Ok("Node has been stopped and is now in DOWN state.")
}

async fn resume_handler(State(node): State<Arc<RaftNode>>) -> Result<&'static str> {
    node.resume_node().await?;
    Ok("Node has been resumed and is now active.")
}

async fn status_handler(State(node): State<Arc<RaftNode>>) -> Result<impl IntoResponse> {
    Ok(Json(node.node_status().await?))
}

async fn cluster_handler(State(node): State<Arc<RaftNode>>) -> impl IntoResponse {
    Json(node.all_node_statuses().await)
}

async fn runtime_handler(State(node): State<Arc<RaftNode>>) -> impl IntoResponse {
    Json(node.runtime_status().await)
}

async fn status_stream_handler(
    State(node): State<Arc<RaftNode>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let period = node.config().status_stream_interval();
    let stream = node
        .status()
        .stream_statuses(period)
        .map(|statuses| match Event::default().json_data(&statuses) {
            Ok(event) => Ok(event),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode status event");
                Ok(Event::default().event("error").data(e.to_string()))
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
