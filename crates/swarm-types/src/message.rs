use crate::AgentId;

/// Destination of a message: a single agent, or every reachable agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageTarget {
    Agent(AgentId),
    Broadcast,
}

/// Best-effort, in-process message. Never persisted.
#[derive(Debug, Clone)]
pub struct Message {
    pub from: AgentId,
    pub to: MessageTarget,
    pub payload: serde_json::Value,
    /// Logical (Lamport-style) timestamp assigned by the coordinator at send time.
    pub logical_ts: u64,
}

impl Message {
    pub fn new(from: impl Into<AgentId>, to: MessageTarget, payload: serde_json::Value, logical_ts: u64) -> Self {
        Self { from: from.into(), to, payload, logical_ts }
    }
}
