mod engine;
mod error;
mod types;

pub use engine::ConsensusEngine;
pub use error::ConsensusError;
pub use types::{ConsensusConfig, ConsensusResult, ConsensusState, Decision, LogEntry, NodeState};
