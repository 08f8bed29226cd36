pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod node;
pub mod raft;
pub mod shutdown;
pub mod storage;

pub use error::{QuorumError, Result};
