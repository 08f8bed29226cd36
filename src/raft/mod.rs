pub mod monitor;
pub mod node;
pub mod rpc;
pub mod state;
pub mod status;
pub mod timer;
pub mod transition;

pub use monitor::ElectionMonitor;
pub use node::{ElectionOutcome, RaftNode, RuntimeStatus};
pub use rpc::{HeartbeatRequest, VoteRequest, VoteRequestPayload};
pub use state::{NodeRole, NodeState, NodeStatus};
pub use status::StatusAggregator;
pub use transition::StateTransitions;
