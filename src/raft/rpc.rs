use serde::{Deserialize, Serialize};

use crate::error::{QuorumError, Result};
use crate::raft::state::NodeState;

/// Validated vote request from a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub candidate_id: String,
    pub candidate_term: u64,
}

impl VoteRequest {
    pub fn new(candidate_id: impl Into<String>, candidate_term: u64) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            candidate_term,
        }
    }
}

/// Vote request as received on the wire, before validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequestPayload {
    pub candidate_id: Option<String>,
    pub candidate_term: Option<u64>,
}

impl TryFrom<VoteRequestPayload> for VoteRequest {
    type Error = QuorumError;

    fn try_from(payload: VoteRequestPayload) -> Result<Self> {
        match (payload.candidate_id, payload.candidate_term) {
            (Some(candidate_id), Some(candidate_term)) if !candidate_id.is_empty() => {
                Ok(VoteRequest {
                    candidate_id,
                    candidate_term,
                })
            }
            _ => Err(QuorumError::InvalidRequest(
                "'candidateId' or 'candidateTerm' is missing.".to_string(),
            )),
        }
    }
}

/// Optional body of a heartbeat. Peers that send an empty heartbeat are
/// still accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub leader_id: Option<String>,
    pub term: Option<u64>,
}

/// Decide a vote and apply it to `state`.
///
/// Returns whether the vote was granted. A granted vote always leaves the
/// node a follower of the candidate's term; a rejected one leaves `state`
/// untouched.
pub fn handle_request_vote(state: &mut NodeState, req: &VoteRequest) -> bool {
    let granted = if state.stopped {
        false
    } else if req.candidate_term > state.current_term {
        state.advance_term(req.candidate_term);
        true
    } else if req.candidate_term == state.current_term {
        match state.voted_for.as_deref() {
            None => true,
            Some(voted) => voted == req.candidate_id,
        }
    } else {
        false
    };

    if granted {
        state.voted_for = Some(req.candidate_id.clone());
        state.become_follower();
    }

    tracing::debug!(
        node_id = %state.node_id,
        candidate = %req.candidate_id,
        term = req.candidate_term,
        current_term = state.current_term,
        granted,
        "RequestVote decision"
    );

    granted
}
