use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("Node state not found: node {0} has not been initialized")]
    NotInitialized(String),

    #[error("Invalid request payload: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Peer {addr} unreachable: {reason}")]
    PeerUnreachable { addr: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuorumError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QuorumError::NotInitialized(_) => StatusCode::NOT_FOUND,
            QuorumError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            QuorumError::PeerUnreachable { .. } | QuorumError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QuorumError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, QuorumError>;
