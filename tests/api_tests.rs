//! HTTP API tests driving the router directly.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use quorum_lite::client::HttpPeerClient;
use quorum_lite::config::NodeConfig;
use quorum_lite::http::router;
use quorum_lite::raft::{NodeRole, NodeStatus, RaftNode};
use quorum_lite::storage::MemoryStore;

fn single_node() -> Arc<RaftNode> {
    node_with_cluster(&["localhost:0"])
}

fn node_with_cluster(cluster: &[&str]) -> Arc<RaftNode> {
    let config = NodeConfig::new("node1", "127.0.0.1:0".parse().unwrap())
        .with_cluster_nodes(cluster.iter().copied());
    let peers = Arc::new(HttpPeerClient::new(Duration::from_millis(100)).unwrap());
    Arc::new(RaftNode::new(config, Arc::new(MemoryStore::new()), peers))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes)
}

async fn status_of(app: &Router) -> NodeStatus {
    let (code, body) = send(app, Method::GET, "/raft/status", None).await;
    assert_eq!(code, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_status_before_initialize_is_not_found() {
    let app = router(single_node());
    let (code, _) = send(&app, Method::GET, "/raft/status", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let app = router(single_node());

    for _ in 0..2 {
        let (code, body) = send(&app, Method::POST, "/raft/initialize", None).await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.is_empty());
    }

    let status = status_of(&app).await;
    assert_eq!(status.node_id, "node1");
    assert_eq!(status.role, NodeRole::Follower);
    assert_eq!(status.current_term, 0);
    assert_eq!(status.address, "localhost:0");
    assert!(!status.stopped);
}

#[tokio::test]
async fn test_status_json_shape() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;

    let (_, body) = send(&app, Method::GET, "/raft/status", None).await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["nodeId"], "node1");
    assert_eq!(value["role"], "FOLLOWER");
    assert_eq!(value["currentTerm"], 0);
    assert!(value["votedFor"].is_null());
    assert_eq!(value["stopped"], false);
}

#[tokio::test]
async fn test_request_vote_grants_and_persists() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;

    let (code, body) = send(
        &app,
        Method::POST,
        "/raft/request-vote",
        Some(r#"{"candidateId":"node2","candidateTerm":3}"#),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(&body[..], b"true");

    let (_, body) = send(
        &app,
        Method::POST,
        "/raft/request-vote",
        Some(r#"{"candidateId":"node3","candidateTerm":3}"#),
    )
    .await;
    assert_eq!(&body[..], b"false");

    let status = status_of(&app).await;
    assert_eq!(status.current_term, 3);
    assert_eq!(status.voted_for.as_deref(), Some("node2"));
}

#[tokio::test]
async fn test_request_vote_missing_fields_is_bad_request() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;

    let (code, body) = send(
        &app,
        Method::POST,
        "/raft/request-vote",
        Some(r#"{"candidateTerm":3}"#),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("candidateId"));

    let (code, _) = send(&app, Method::POST, "/raft/request-vote", Some("not json")).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    // Nothing reached the engine
    assert_eq!(status_of(&app).await.current_term, 0);
}

#[tokio::test]
async fn test_request_vote_before_initialize_is_not_found() {
    let app = router(single_node());
    let (code, _) = send(
        &app,
        Method::POST,
        "/raft/request-vote",
        Some(r#"{"candidateId":"node2","candidateTerm":1}"#),
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_heartbeat_bodies() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;

    let (code, body) = send(&app, Method::POST, "/raft/heartbeat", None).await;
    assert_eq!(code, StatusCode::OK);
    assert!(body.is_empty());

    let (code, _) = send(
        &app,
        Method::POST,
        "/raft/heartbeat",
        Some(r#"{"leaderId":"node2","term":5}"#),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(status_of(&app).await.current_term, 5);

    let (code, _) = send(&app, Method::POST, "/raft/heartbeat", Some("{oops")).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_leader_steps_down_on_heartbeat() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;

    let (code, _) = send(&app, Method::POST, "/raft/start-election", None).await;
    assert_eq!(code, StatusCode::OK);
    let status = status_of(&app).await;
    assert_eq!(status.role, NodeRole::Leader);
    assert_eq!(status.current_term, 1);

    send(&app, Method::POST, "/raft/heartbeat", None).await;
    assert_eq!(status_of(&app).await.role, NodeRole::Follower);
}

#[tokio::test]
async fn test_stop_and_resume() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;
    send(&app, Method::POST, "/raft/start-election", None).await;

    let (code, body) = send(&app, Method::GET, "/raft/stop", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(
        String::from_utf8_lossy(&body),
        "Node has been stopped and is now in DOWN state."
    );

    let status = status_of(&app).await;
    assert_eq!(status.role, NodeRole::Down);
    assert!(status.stopped);

    // A stopped node neither campaigns nor votes
    send(&app, Method::POST, "/raft/start-election", None).await;
    assert_eq!(status_of(&app).await.current_term, 1);
    let (_, body) = send(
        &app,
        Method::POST,
        "/raft/request-vote",
        Some(r#"{"candidateId":"node2","candidateTerm":9}"#),
    )
    .await;
    assert_eq!(&body[..], b"false");

    let (code, body) = send(&app, Method::GET, "/raft/resume", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(
        String::from_utf8_lossy(&body),
        "Node has been resumed and is now active."
    );

    let status = status_of(&app).await;
    assert_eq!(status.role, NodeRole::Follower);
    assert!(!status.stopped);
}

#[tokio::test]
async fn test_stop_before_initialize_creates_down_record() {
    let app = router(single_node());
    let (code, _) = send(&app, Method::GET, "/raft/stop", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(status_of(&app).await.role, NodeRole::Down);
}

#[tokio::test]
async fn test_resume_before_initialize_is_not_found() {
    let app = router(single_node());
    let (code, _) = send(&app, Method::GET, "/raft/resume", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cluster_reports_unreachable_peers_down() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let node = node_with_cluster(&["localhost:0", &closed]);
    let app = router(node);
    send(&app, Method::POST, "/raft/initialize", None).await;

    let (code, body) = send(&app, Method::GET, "/raft/cluster", None).await;
    assert_eq!(code, StatusCode::OK);
    let statuses: Vec<NodeStatus> = serde_json::from_slice(&body).unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].role, NodeRole::Follower);
    assert_eq!(statuses[1].role, NodeRole::Down);
    assert_eq!(statuses[1].node_id, closed);
    assert_eq!(statuses[1].current_term, 0);
}

#[tokio::test]
async fn test_runtime_diagnostics() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;
    send(&app, Method::POST, "/raft/heartbeat", None).await;

    let (code, body) = send(&app, Method::GET, "/raft/runtime", None).await;
    assert_eq!(code, StatusCode::OK);
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["nodeId"], "node1");
    assert_eq!(value["electionInProgress"], false);
    assert!(value["lastHeartbeatAt"].is_string());
    assert!(value["electionDeadlineInMs"].is_u64());
}

#[tokio::test]
async fn test_status_stream_sends_events() {
    let app = router(single_node());
    send(&app, Method::POST, "/raft/initialize", None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/raft/status-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("no event within timeout")
        .expect("stream ended")
        .unwrap();
    let data = frame.into_data().unwrap();
    let text = String::from_utf8_lossy(&data);
    assert!(text.starts_with("data: "), "unexpected frame: {}", text);

    let json = text.trim_start_matches("data: ").trim();
    let statuses: Vec<NodeStatus> = serde_json::from_str(json).unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].node_id, "node1");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = router(single_node());
    let (code, _) = send(&app, Method::GET, "/raft/append-entries", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}
