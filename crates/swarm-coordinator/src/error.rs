use thiserror::Error;
use swarm_types::AgentId;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("agent already registered: {0}")]
    DuplicateAgent(AgentId),
    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),
    #[error("invalid state transition for agent {agent}: {from} -> {to}")]
    InvalidState { agent: AgentId, from: String, to: String },
    #[error(transparent)]
    Topology(#[from] swarm_topology::TopologyError),
    #[error(transparent)]
    Hook(#[from] swarm_hooks::HookError),
    #[error(transparent)]
    Storage(#[from] swarm_store::StorageError),
}
