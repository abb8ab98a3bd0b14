use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use swarm_types::AgentId;

/// Role in the Raft state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeState {
    Follower,
    Candidate,
    Leader,
}

/// One replicated log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub payload: serde_json::Value,
    pub committed: bool,
}

#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub election_timeout_base_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self { election_timeout_base_ms: 5000, heartbeat_interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
    Timeout,
}

/// Outcome of a `propose` call.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    pub decision: Decision,
    pub votes_for: usize,
    pub votes_against: usize,
    pub abstain: usize,
    pub threshold: usize,
    pub participants: usize,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Snapshot returned by `get_state`.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusState {
    pub node_state: NodeState,
    pub current_term: u64,
    pub leader_id: Option<AgentId>,
    pub commit_index: u64,
    pub log_len: usize,
}
