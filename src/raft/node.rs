use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::client::{is_peer_down, PeerClient};
use crate::config::NodeConfig;
use crate::error::{QuorumError, Result};
use crate::raft::rpc::{handle_request_vote, HeartbeatRequest, VoteRequest};
use crate::raft::state::{NodeRole, NodeState, NodeStatus};
use crate::raft::status::StatusAggregator;
use crate::raft::timer::ElectionTimer;
use crate::raft::transition::StateTransitions;
use crate::storage::NodeStateStore;

/// Result of one call to [`RaftNode::start_election`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// Another election of this node was still running; nothing happened
    AlreadyRunning,
    /// The node is stopped and does not campaign
    Stopped,
    Won { term: u64, votes: usize },
    /// Not enough votes; the node stays candidate until the next timeout
    Lost { term: u64, votes: usize },
}

/// In-memory failure detection state, as exposed for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub node_id: String,
    pub election_in_progress: bool,
    pub election_deadline_in_ms: u64,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub ms_since_last_heartbeat: Option<u64>,
}

enum HeartbeatEffect {
    Stale { own_term: u64 },
    /// Role before, whether the term was adopted, term after
    Accepted(Option<(NodeRole, bool, u64)>),
}

/// Releases the single-flight flag on every exit path of an election
struct ElectionGuard<'a>(&'a AtomicBool);

impl Drop for ElectionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Election engine of one cluster member.
///
/// Persisted state (role, term, vote, stopped flag) lives in the node state
/// store and is only mutated through [`StateTransitions`]. The election
/// deadline and the single-flight flag are process-local.
pub struct RaftNode {
    pub id: String,
    config: NodeConfig,
    transitions: Arc<StateTransitions>,
    peers: Arc<dyn PeerClient>,
    status: Arc<StatusAggregator>,
    timer: RwLock<ElectionTimer>,
    election_in_progress: AtomicBool,
    readiness_running: AtomicBool,
    shutdown: CancellationToken,
}

impl RaftNode {
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn NodeStateStore>,
        peers: Arc<dyn PeerClient>,
    ) -> Self {
        let transitions = Arc::new(StateTransitions::new(store));
        let status = Arc::new(StatusAggregator::new(
            &config,
            transitions.clone(),
            peers.clone(),
        ));
        let timer = ElectionTimer::new(
            config.election_timeout_min_ms,
            config.election_timeout_max_ms,
        );

        Self {
            id: config.node_id.clone(),
            config,
            transitions,
            peers,
            status,
            timer: RwLock::new(timer),
            election_in_progress: AtomicBool::new(false),
            readiness_running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn status(&self) -> Arc<StatusAggregator> {
        self.status.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Stored record of this node, `None` before `initialize`
    pub async fn state(&self) -> Result<Option<NodeState>> {
        self.transitions.find(&self.id).await
    }

    pub async fn is_leader(&self) -> bool {
        matches!(self.state().await, Ok(Some(state)) if state.is_leader())
    }

    pub async fn current_term(&self) -> u64 {
        match self.state().await {
            Ok(Some(state)) => state.current_term,
            _ => 0,
        }
    }

    pub fn election_in_progress(&self) -> bool {
        self.election_in_progress.load(Ordering::Acquire)
    }

    /// Create the record if missing and, unless the node is stopped or
    /// already leading, start converging on a leader in the background.
    pub async fn initialize(self: &Arc<Self>) -> Result<NodeState> {
        tracing::info!(node_id = %self.id, "Initializing node");

        let id = self.id.clone();
        let (state, created) = self
            .transitions
            .update(&self.id, |record| {
                let created = record.is_none();
                let state = record.get_or_insert_with(|| NodeState::new(id));
                (state.clone(), created)
            })
            .await?;

        if created {
            self.timer.write().await.reset();
            tracing::info!(node_id = %self.id, "Created node state as follower at term 0");
        }

        if state.stopped {
            tracing::info!(node_id = %self.id, "Node is marked as stopped, skipping initialization");
            return Ok(state);
        }
        if !state.is_leader() {
            self.spawn_readiness_loop();
        }
        Ok(state)
    }

    /// Decide a vote request from a candidate. Every grant is persisted in
    /// the same serialized write that made the decision.
    pub async fn request_vote(&self, req: &VoteRequest) -> Result<bool> {
        tracing::debug!(
            node_id = %self.id,
            candidate = %req.candidate_id,
            term = req.candidate_term,
            "Received vote request"
        );

        let decision = self
            .transitions
            .update(&self.id, |record| {
                record
                    .as_mut()
                    .map(|state| handle_request_vote(state, req))
            })
            .await?;

        let granted = decision.ok_or_else(|| QuorumError::NotInitialized(self.id.clone()))?;
        if granted {
            self.timer.write().await.reset();
        }
        Ok(granted)
    }

    /// Campaign for leadership of the next term.
    ///
    /// Single-flight: a call made while another election of this node is
    /// running returns [`ElectionOutcome::AlreadyRunning`] without touching
    /// any state.
    pub async fn start_election(&self) -> Result<ElectionOutcome> {
        if self
            .election_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(node_id = %self.id, "Election already in progress, skipping");
            return Ok(ElectionOutcome::AlreadyRunning);
        }
        let _guard = ElectionGuard(&self.election_in_progress);

        let candidate = self
            .transitions
            .update(&self.id, |record| match record {
                Some(state) if !state.stopped => {
                    state.become_candidate();
                    Some(Some(state.clone()))
                }
                Some(_) => Some(None),
                None => None,
            })
            .await?
            .ok_or_else(|| QuorumError::NotInitialized(self.id.clone()))?;

        let Some(candidate) = candidate else {
            tracing::info!(node_id = %self.id, "Node is stopped, not starting an election");
            return Ok(ElectionOutcome::Stopped);
        };

        let term = candidate.current_term;
        tracing::info!(node_id = %self.id, term, "Starting election");

        let req = VoteRequest::new(self.id.clone(), term);
        let peer_addrs = self.config.peer_addrs();
        let ballots = join_all(peer_addrs.iter().map(|addr| self.ask_for_vote(addr, &req))).await;

        // Our own vote is implicit
        let votes = ballots.iter().filter(|granted| **granted).count() + 1;
        let majority = self.config.majority();
        tracing::info!(node_id = %self.id, term, votes, majority, "Collected votes");

        if votes < majority {
            tracing::debug!(
                node_id = %self.id,
                term,
                votes,
                needed = majority,
                "Election failed, not enough votes"
            );
            return Ok(ElectionOutcome::Lost { term, votes });
        }

        let leader = self.transitions.become_leader(&candidate).await?;
        if leader.is_leader() {
            Ok(ElectionOutcome::Won { term, votes })
        } else {
            tracing::info!(
                node_id = %self.id,
                term,
                stored_term = leader.current_term,
                "Won votes but the term moved on, not taking leadership"
            );
            Ok(ElectionOutcome::Lost { term, votes })
        }
    }

    async fn ask_for_vote(&self, addr: &str, req: &VoteRequest) -> bool {
        tracing::debug!(node_id = %self.id, peer = %addr, "Sending vote request");
        match timeout(self.config.rpc_timeout(), self.peers.request_vote(addr, req)).await {
            Ok(Ok(granted)) => {
                tracing::debug!(node_id = %self.id, peer = %addr, granted, "Vote response");
                granted
            }
            Ok(Err(e)) => {
                log_peer_failure(addr, &e, "Vote request failed");
                false
            }
            Err(_) => {
                tracing::debug!(peer = %addr, "Vote request timed out");
                false
            }
        }
    }

    /// Handle a heartbeat from a leader.
    ///
    /// Pushes the election deadline out. A node that believes it is leader
    /// (or is still campaigning) steps down to follower; a higher term carried
    /// by the heartbeat is adopted. A heartbeat stamped with a term older than
    /// ours comes from a deposed leader and is ignored entirely.
    pub async fn receive_heartbeat(&self, req: &HeartbeatRequest) -> Result<()> {
        let effect = self
            .transitions
            .update(&self.id, |record| {
                let Some(state) = record.as_mut() else {
                    return HeartbeatEffect::Accepted(None);
                };
                if req.term.is_some_and(|t| t < state.current_term) {
                    return HeartbeatEffect::Stale {
                        own_term: state.current_term,
                    };
                }
                if state.stopped {
                    return HeartbeatEffect::Accepted(None);
                }
                let previous = state.role;
                let adopted = req.term.map(|t| state.advance_term(t)).unwrap_or(false);
                if matches!(previous, NodeRole::Leader | NodeRole::Candidate) {
                    state.become_follower();
                }
                HeartbeatEffect::Accepted(Some((previous, adopted, state.current_term)))
            })
            .await?;

        let change = match effect {
            HeartbeatEffect::Stale { own_term } => {
                tracing::debug!(
                    node_id = %self.id,
                    own_term,
                    term = ?req.term,
                    from = ?req.leader_id,
                    "Ignoring heartbeat from an older term"
                );
                return Ok(());
            }
            HeartbeatEffect::Accepted(change) => change,
        };

        self.timer.write().await.heartbeat_received();

        if let Some((previous, adopted, term)) = change {
            if previous == NodeRole::Leader {
                tracing::warn!(
                    node_id = %self.id,
                    term,
                    from = ?req.leader_id,
                    "Leader received heartbeat from another leader, stepping down"
                );
            } else if previous == NodeRole::Candidate {
                tracing::info!(node_id = %self.id, term, from = ?req.leader_id, "Candidate saw a leader, becoming follower");
            }
            if adopted {
                tracing::debug!(node_id = %self.id, term, "Adopted term from heartbeat");
            }
        }
        Ok(())
    }

    /// One round of failure detection, driven by the monitor.
    ///
    /// Leaders send heartbeats; followers and candidates start an election
    /// once their deadline has passed. Stopped or uninitialized nodes do
    /// nothing.
    pub async fn tick(&self) -> Result<()> {
        let Some(state) = self.state().await? else {
            return Ok(());
        };
        if state.stopped {
            tracing::trace!(node_id = %self.id, "Node is stopped, skipping tick");
            return Ok(());
        }
        if state.is_leader() {
            self.send_heartbeats(&state).await;
            return Ok(());
        }

        let expired = {
            let mut timer = self.timer.write().await;
            if timer.is_expired() {
                timer.reset();
                true
            } else {
                false
            }
        };
        if !expired {
            return Ok(());
        }

        tracing::info!(node_id = %self.id, term = state.current_term, "Election deadline exceeded, initiating election");
        let outcome = self.start_election().await;
        self.timer.write().await.reset();
        outcome.map(|_| ())
    }

    /// Best-effort heartbeat to every peer; failures are logged and ignored
    pub async fn send_heartbeats(&self, state: &NodeState) {
        let req = HeartbeatRequest {
            leader_id: Some(self.id.clone()),
            term: Some(state.current_term),
        };
        let peer_addrs = self.config.peer_addrs();

        join_all(peer_addrs.iter().map(|addr| {
            let req = &req;
            async move {
                match timeout(self.config.rpc_timeout(), self.peers.heartbeat(addr, req)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log_peer_failure(addr, &e, "Failed to send heartbeat"),
                    Err(_) => tracing::trace!(peer = %addr, "Heartbeat timed out"),
                }
            }
        }))
        .await;
    }

    /// Look around the cluster once.
    ///
    /// Returns `true` when nothing more needs to be done: a peer leads at our
    /// term or later (we step down if we thought we led), we lead ourselves,
    /// or we just ran an election. Returns `false` while another election of
    /// ours is still in flight.
    pub async fn check_cluster_readiness(&self) -> Result<bool> {
        let Some(state) = self.state().await? else {
            return Ok(false);
        };
        if state.stopped {
            return Ok(true);
        }

        let peers = self.status.peer_statuses().await;
        let existing_leader = peers
            .iter()
            .find(|s| s.role == NodeRole::Leader && s.current_term >= state.current_term);

        if let Some(leader) = existing_leader {
            if let Some(current) = self.state().await? {
                if current.is_leader() {
                    self.transitions.step_down(&current).await?;
                }
            }
            tracing::info!(
                node_id = %self.id,
                leader = %leader.node_id,
                term = leader.current_term,
                "Cluster already has a leader"
            );
            return Ok(true);
        }

        if state.is_leader() {
            return Ok(true);
        }
        if self.election_in_progress() {
            return Ok(false);
        }

        tracing::info!(node_id = %self.id, "No leader visible, starting election");
        self.start_election().await?;
        Ok(true)
    }

    /// Run [`Self::check_cluster_readiness`] every readiness interval, first
    /// one interval from now, until it reports ready. At most one loop runs
    /// per node.
    pub fn spawn_readiness_loop(self: &Arc<Self>) {
        if self
            .readiness_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let node = self.clone();
        tokio::spawn(async move {
            let period = node.config.readiness_interval();
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = node.shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                match node.check_cluster_readiness().await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => tracing::warn!(node_id = %node.id, error = %e, "Readiness check failed"),
                }
            }
            node.readiness_running.store(false, Ordering::Release);
            tracing::debug!(node_id = %node.id, "Readiness check finished");
        });
    }

    /// Mark the node stopped and DOWN, creating the record if needed
    pub async fn stop_node(&self) -> Result<NodeState> {
        let id = self.id.clone();
        let state = self
            .transitions
            .update(&self.id, |record| {
                let state = record.get_or_insert_with(|| NodeState::stopped(id));
                state.stop();
                state.clone()
            })
            .await?;
        tracing::info!(node_id = %self.id, "Node has been stopped and set to DOWN state");
        Ok(state)
    }

    /// Clear the stopped flag; a DOWN node comes back as follower
    pub async fn resume_node(&self) -> Result<NodeState> {
        let state = self
            .transitions
            .update(&self.id, |record| {
                record.as_mut().map(|state| {
                    state.resume();
                    state.clone()
                })
            })
            .await?
            .ok_or_else(|| QuorumError::NotInitialized(self.id.clone()))?;

        self.timer.write().await.reset();
        tracing::info!(node_id = %self.id, role = %state.role, "Node has been resumed and is now active");
        Ok(state)
    }

    pub async fn node_status(&self) -> Result<NodeStatus> {
        self.status.local_status().await
    }

    pub async fn all_node_statuses(&self) -> Vec<NodeStatus> {
        self.status.get_all_node_statuses().await
    }

    pub async fn runtime_status(&self) -> RuntimeStatus {
        let timer = self.timer.read().await;
        RuntimeStatus {
            node_id: self.id.clone(),
            election_in_progress: self.election_in_progress(),
            election_deadline_in_ms: timer.remaining().as_millis() as u64,
            last_heartbeat_at: timer.last_heartbeat_at(),
            ms_since_last_heartbeat: timer.since_last_heartbeat().map(|d| d.as_millis() as u64),
        }
    }
}

fn log_peer_failure(addr: &str, err: &QuorumError, message: &str) {
    if is_peer_down(err) {
        tracing::debug!(peer = %addr, error = %err, "{}", message);
    } else {
        tracing::warn!(peer = %addr, error = %err, "{}", message);
    }
}
