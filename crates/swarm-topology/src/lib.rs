//! Agent-connectivity graphs: five variants behind a common
//! capability trait, with an `Adaptive` wrapper that switches the inner
//! variant on load/size/failure-ratio signals.

mod adaptive;
mod error;
mod hierarchical;
mod manager;
mod mesh;
mod ring;
mod star;

pub use error::TopologyError;
pub use manager::{TopologyManager, TopologyMetrics};

use serde::{Deserialize, Serialize};
use swarm_types::{AgentId, AgentState, TopologyExtras};

/// Which connectivity pattern is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    Mesh,
    Star,
    Ring,
    Hierarchical,
    Adaptive,
}

impl TopologyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyKind::Mesh => "mesh",
            TopologyKind::Star => "star",
            TopologyKind::Ring => "ring",
            TopologyKind::Hierarchical => "hierarchical",
            TopologyKind::Adaptive => "adaptive",
        }
    }
}

impl std::str::FromStr for TopologyKind {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mesh" => Ok(TopologyKind::Mesh),
            "star" => Ok(TopologyKind::Star),
            "ring" => Ok(TopologyKind::Ring),
            "hierarchical" => Ok(TopologyKind::Hierarchical),
            "adaptive" => Ok(TopologyKind::Adaptive),
            other => Err(TopologyError::UnknownKind(other.to_string())),
        }
    }
}

/// Options accepted by `add_agent`; most fields only matter to one variant.
#[derive(Debug, Clone, Default)]
pub struct AddAgentOpts {
    /// Hierarchical: required for every non-root agent.
    pub parent_id: Option<AgentId>,
    /// Star: set this agent as hub, replacing the current one if any.
    pub make_hub: bool,
}

/// Capability interface every topology variant implements: a closed tagged
/// set of connectivity strategies sharing one mutation/query surface.
pub trait Topology: Send + Sync {
    fn kind(&self) -> TopologyKind;

    /// Inserts `id` and wires edges to satisfy the variant's invariant.
    /// Returns the topology-dependent extras to store on the agent record.
    fn add_agent(&mut self, id: AgentId, opts: &AddAgentOpts) -> Result<TopologyExtras, TopologyError>;

    /// Removes `id`, repairing edges (ring: splice gap; hierarchical:
    /// reparent children to grandparent). No-op, `Ok(())`, if unknown.
    fn remove_agent(&mut self, id: &AgentId) -> Result<(), TopologyError>;

    /// Updates the cached liveness state used by `broadcast_targets` and
    /// failure-ratio accounting. No-op if `id` is unknown.
    fn set_state(&mut self, id: &AgentId, state: AgentState);

    fn neighbors_of(&self, id: &AgentId) -> Vec<AgentId>;

    /// Recomputes the extras carried on the agent record (hierarchy layer,
    /// parent, ring position) from the topology's current internal state.
    /// Used after a mutation — e.g. a hierarchical reparent on removal —
    /// that leaves previously-issued extras stale. `TopologyExtras::default()`
    /// for unknown `id` or variants that carry no extras.
    fn extras_of(&self, id: &AgentId) -> TopologyExtras;

    fn connection_count(&self) -> usize;

    fn agent_ids(&self) -> Vec<AgentId>;

    /// All agents that should receive a broadcast originating at `from_id`.
    fn broadcast_targets(&self, from_id: &AgentId) -> Vec<AgentId>;

    /// Human-readable adjacency dump, e.g. for debugging/inspection tools.
    fn visualize(&self) -> String;
}
