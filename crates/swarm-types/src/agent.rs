use crate::Metadata;
use std::time::Instant;

/// Opaque agent identifier, unique within a single coordinator.
pub type AgentId = String;

/// Agent lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Active,
    Idle,
    Busy,
    Failed,
}

impl AgentState {
    /// `FAILED -> *` is only allowed via the heartbeat recovery path
    /// (`update_agent_heartbeat`), never via `set_agent_state`. Every other
    /// transition, including a no-op `x -> x`, is permitted.
    pub fn settable_from(&self, to: AgentState) -> bool {
        !(*self == AgentState::Failed && to != AgentState::Failed)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Active => "ACTIVE",
            AgentState::Idle => "IDLE",
            AgentState::Busy => "BUSY",
            AgentState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Topology-dependent extras carried per agent. Only the fields relevant to
/// the currently active topology are populated; the others stay `None`.
#[derive(Debug, Clone, Default)]
pub struct TopologyExtras {
    /// Hierarchical: distance from the root (root = 0).
    pub hierarchy_layer: Option<u32>,
    /// Hierarchical: parent agent id (`None` only for the root).
    pub parent_id: Option<AgentId>,
    /// Ring: position in the Hamiltonian cycle, in registration order.
    pub ring_position: Option<usize>,
}

/// A registered agent: identity, metadata, lifecycle state, and the extras
/// the current topology needs to maintain its invariants.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub agent_type: String,
    pub metadata: Metadata,
    pub state: AgentState,
    pub last_heartbeat: Instant,
    pub topology: TopologyExtras,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, agent_type: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            metadata,
            state: AgentState::Active,
            last_heartbeat: Instant::now(),
            topology: TopologyExtras::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_heartbeat = Instant::now();
    }
}

/// Read-only snapshot of an agent, safe to hand to callers or serialize.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub agent_type: String,
    pub metadata: Metadata,
    pub state: AgentState,
    pub last_heartbeat_age_ms: u64,
    pub hierarchy_layer: Option<u32>,
    pub parent_id: Option<AgentId>,
    pub ring_position: Option<usize>,
}

impl From<&Agent> for AgentSnapshot {
    fn from(a: &Agent) -> Self {
        Self {
            id: a.id.clone(),
            agent_type: a.agent_type.clone(),
            metadata: a.metadata.clone(),
            state: a.state,
            last_heartbeat_age_ms: a.last_heartbeat.elapsed().as_millis() as u64,
            hierarchy_layer: a.topology.hierarchy_layer,
            parent_id: a.topology.parent_id.clone(),
            ring_position: a.topology.ring_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_only_recoverable_via_heartbeat_path() {
        assert!(!AgentState::Failed.settable_from(AgentState::Active));
        assert!(AgentState::Failed.settable_from(AgentState::Failed));
        assert!(AgentState::Active.settable_from(AgentState::Busy));
        assert!(AgentState::Idle.settable_from(AgentState::Failed));
    }

    #[test]
    fn snapshot_copies_topology_extras() {
        let mut agent = Agent::new("a1", "worker", Metadata::new());
        agent.topology.hierarchy_layer = Some(2);
        agent.topology.parent_id = Some("root".to_string());
        let snap = AgentSnapshot::from(&agent);
        assert_eq!(snap.hierarchy_layer, Some(2));
        assert_eq!(snap.parent_id.as_deref(), Some("root"));
    }
}
