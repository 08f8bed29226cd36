use serde::{Deserialize, Serialize};

/// Position of a node in the election protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    Follower,
    Candidate,
    Leader,
    /// Stopped by an operator or unreachable
    Down,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Follower => write!(f, "FOLLOWER"),
            NodeRole::Candidate => write!(f, "CANDIDATE"),
            NodeRole::Leader => write!(f, "LEADER"),
            NodeRole::Down => write!(f, "DOWN"),
        }
    }
}

/// Persisted election state of one cluster member.
///
/// # Invariants
///
/// ## Term monotonicity
/// `current_term` never decreases. Every term change goes through
/// [`NodeState::advance_term`] or [`NodeState::become_candidate`], both of which
/// only move forward.
///
/// ## One vote per term
/// `voted_for` is written at most once per term and cleared when the term
/// advances, so a node can never back two candidates in the same term.
///
/// ## Stopped nodes are never leaders
/// A stopped node reports [`NodeRole::Down`] through [`NodeState::effective_role`]
/// regardless of the stored role, and [`NodeState::is_leader`] is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub node_id: String,
    pub role: NodeRole,
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub stopped: bool,
}

impl NodeState {
    /// Fresh follower at term 0
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            role: NodeRole::Follower,
            current_term: 0,
            voted_for: None,
            stopped: false,
        }
    }

    /// Record created when a node is stopped before it was ever initialized
    pub fn stopped(node_id: impl Into<String>) -> Self {
        Self {
            role: NodeRole::Down,
            stopped: true,
            ..Self::new(node_id)
        }
    }

    /// Role as observed from outside: DOWN whenever the node is stopped
    pub fn effective_role(&self) -> NodeRole {
        if self.stopped {
            NodeRole::Down
        } else {
            self.role
        }
    }

    pub fn is_leader(&self) -> bool {
        self.role == NodeRole::Leader && !self.stopped
    }

    /// Move to a higher term, forgetting the vote cast in the old one.
    /// Lower or equal terms are ignored.
    pub fn advance_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }
        self.current_term = term;
        self.voted_for = None;
        true
    }

    /// Start campaigning: next term, vote for self
    pub fn become_candidate(&mut self) {
        self.role = NodeRole::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.node_id.clone());
    }

    pub fn become_follower(&mut self) {
        self.role = NodeRole::Follower;
    }

    pub fn stop(&mut self) {
        self.role = NodeRole::Down;
        self.stopped = true;
    }

    pub fn resume(&mut self) {
        self.stopped = false;
        if self.role == NodeRole::Down {
            self.role = NodeRole::Follower;
        }
    }
}

/// Read-only status projection served to operators and peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub node_id: String,
    pub role: NodeRole,
    pub current_term: u64,
    pub voted_for: Option<String>,
    pub address: String,
    pub stopped: bool,
}

impl NodeStatus {
    pub fn from_state(state: &NodeState, address: impl Into<String>) -> Self {
        Self {
            node_id: state.node_id.clone(),
            role: state.effective_role(),
            current_term: state.current_term,
            voted_for: state.voted_for.clone(),
            address: address.into(),
            stopped: state.stopped,
        }
    }

    /// Placeholder for a member that could not be asked
    pub fn unreachable(node_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            role: NodeRole::Down,
            current_term: 0,
            voted_for: None,
            address: address.into(),
            stopped: true,
        }
    }
}
