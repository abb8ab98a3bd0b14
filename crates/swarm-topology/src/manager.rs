use crate::adaptive::AdaptiveTopology;
use crate::hierarchical::HierarchicalTopology;
use crate::mesh::MeshTopology;
use crate::ring::RingTopology;
use crate::star::StarTopology;
use crate::{AddAgentOpts, Topology, TopologyError, TopologyKind};
use serde::Serialize;
use swarm_types::{AgentId, AgentState, TopologyExtras};
use tracing::info;

/// Snapshot returned by `get_topology_info`.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyMetrics {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub agent_count: usize,
    pub connection_count: usize,
    pub active_agents: usize,
    pub failed_agents: usize,
    pub health: &'static str,
}

/// Owns one concrete topology at a time. An enum rather than `Box<dyn
/// Topology>` so the manager can match out `Adaptive` to drive its extra
/// traffic-recording methods without downcasting.
enum Active {
    Mesh(MeshTopology),
    Star(StarTopology),
    Ring(RingTopology),
    Hierarchical(HierarchicalTopology),
    Adaptive(AdaptiveTopology),
}

impl Active {
    fn as_topology(&self) -> &dyn Topology {
        match self {
            Active::Mesh(t) => t,
            Active::Star(t) => t,
            Active::Ring(t) => t,
            Active::Hierarchical(t) => t,
            Active::Adaptive(t) => t,
        }
    }

    fn as_topology_mut(&mut self) -> &mut dyn Topology {
        match self {
            Active::Mesh(t) => t,
            Active::Star(t) => t,
            Active::Ring(t) => t,
            Active::Hierarchical(t) => t,
            Active::Adaptive(t) => t,
        }
    }
}

/// Facade the coordinator talks to: owns the active topology, switches it on
/// request or (for `Adaptive`) on each scheduler tick.
pub struct TopologyManager {
    kind: TopologyKind,
    inner: Active,
    states: std::collections::HashMap<AgentId, AgentState>,
}

fn build(kind: TopologyKind) -> Active {
    match kind {
        TopologyKind::Mesh => Active::Mesh(MeshTopology::new()),
        TopologyKind::Star => Active::Star(StarTopology::new()),
        TopologyKind::Ring => Active::Ring(RingTopology::new()),
        TopologyKind::Hierarchical => Active::Hierarchical(HierarchicalTopology::new()),
        TopologyKind::Adaptive => Active::Adaptive(AdaptiveTopology::new()),
    }
}

impl TopologyManager {
    pub fn new(kind: TopologyKind) -> Self {
        Self { kind, inner: build(kind), states: std::collections::HashMap::new() }
    }

    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    pub fn add_agent(&mut self, id: AgentId, opts: &AddAgentOpts) -> Result<TopologyExtras, TopologyError> {
        let extras = self.inner.as_topology_mut().add_agent(id.clone(), opts)?;
        self.states.insert(id, AgentState::Active);
        Ok(extras)
    }

    pub fn remove_agent(&mut self, id: &AgentId) -> Result<(), TopologyError> {
        self.inner.as_topology_mut().remove_agent(id)?;
        self.states.remove(id);
        Ok(())
    }

    pub fn set_state(&mut self, id: &AgentId, state: AgentState) {
        self.inner.as_topology_mut().set_state(id, state);
        if let Some(s) = self.states.get_mut(id) {
            *s = state;
        }
    }

    pub fn neighbors_of(&self, id: &AgentId) -> Vec<AgentId> {
        self.inner.as_topology().neighbors_of(id)
    }

    pub fn extras_of(&self, id: &AgentId) -> TopologyExtras {
        self.inner.as_topology().extras_of(id)
    }

    pub fn broadcast_targets(&self, from_id: &AgentId) -> Vec<AgentId> {
        self.inner.as_topology().broadcast_targets(from_id)
    }

    pub fn visualize(&self) -> String {
        self.inner.as_topology().visualize()
    }

    /// Records a point-to-point send for the adaptive heuristic; a no-op
    /// under non-adaptive topologies.
    pub fn record_message(&mut self, from: &AgentId, to: &AgentId) {
        if let Active::Adaptive(adaptive) = &mut self.inner {
            adaptive.record_message(from, to);
        }
    }

    pub fn record_broadcast(&mut self, recipient_count: usize) {
        if let Active::Adaptive(adaptive) = &mut self.inner {
            adaptive.record_broadcast(recipient_count);
        }
    }

    /// One scheduler tick: for `Adaptive`, evaluates and applies a switch if
    /// the policy calls for a different inner variant. No-op otherwise.
    pub fn tick(&mut self) -> Result<Option<TopologyKind>, TopologyError> {
        let Active::Adaptive(adaptive) = &mut self.inner else { return Ok(None) };
        let agent_count = adaptive.agent_ids().len();
        let failed = self.states.values().filter(|s| **s == AgentState::Failed).count();
        let failed_ratio = if agent_count == 0 { 0.0 } else { failed as f64 / agent_count as f64 };
        let target = adaptive.evaluate_target(agent_count, failed_ratio);
        let current = adaptive.inner_kind();
        if target == current {
            return Ok(None);
        }
        adaptive.rebuild_as(target)?;
        info!(from = current.as_str(), to = target.as_str(), "adaptive topology switched inner variant");
        Ok(Some(target))
    }

    /// Switches the active topology kind, preserving agent IDs and states.
    /// A repeat call with the same kind is a no-op.
    pub fn switch_topology(&mut self, new_kind: TopologyKind) -> Result<bool, TopologyError> {
        if new_kind == self.kind {
            return Ok(false);
        }
        let ids = self.inner.as_topology().agent_ids();
        let mut fresh = build(new_kind);

        let mut ordered = ids.clone();
        ordered.sort();
        for (i, id) in ordered.iter().enumerate() {
            let opts = if new_kind == TopologyKind::Hierarchical && i > 0 {
                AddAgentOpts { parent_id: Some(ordered[0].clone()), ..Default::default() }
            } else {
                AddAgentOpts::default()
            };
            fresh.as_topology_mut().add_agent(id.clone(), &opts)?;
        }
        for (id, state) in &self.states {
            fresh.as_topology_mut().set_state(id, *state);
        }
        self.inner = fresh;
        self.kind = new_kind;
        Ok(true)
    }

    pub fn metrics(&self) -> TopologyMetrics {
        let agent_count = self.states.len();
        let failed_agents = self.states.values().filter(|s| **s == AgentState::Failed).count();
        let active_agents = agent_count - failed_agents;
        let ratio = if agent_count == 0 { 0.0 } else { failed_agents as f64 / agent_count as f64 };
        let health = if ratio > 0.5 {
            "critical"
        } else if ratio > 0.1 {
            "degraded"
        } else {
            "ok"
        };
        TopologyMetrics {
            kind: self.kind.as_str(),
            agent_count,
            connection_count: self.inner.as_topology().connection_count(),
            active_agents,
            failed_agents,
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_preserves_agents_and_states() {
        let mut mgr = TopologyManager::new(TopologyKind::Mesh);
        for id in ["a1", "a2", "a3"] {
            mgr.add_agent(id.to_string(), &AddAgentOpts::default()).unwrap();
        }
        mgr.set_state(&"a2".to_string(), AgentState::Failed);
        assert!(mgr.switch_topology(TopologyKind::Ring).unwrap());
        assert_eq!(mgr.kind(), TopologyKind::Ring);
        let metrics = mgr.metrics();
        assert_eq!(metrics.agent_count, 3);
        assert_eq!(metrics.failed_agents, 1);
    }

    #[test]
    fn repeated_switch_to_same_kind_is_a_noop() {
        let mut mgr = TopologyManager::new(TopologyKind::Mesh);
        mgr.add_agent("a1".to_string(), &AddAgentOpts::default()).unwrap();
        assert!(mgr.switch_topology(TopologyKind::Star).unwrap());
        assert!(!mgr.switch_topology(TopologyKind::Star).unwrap());
    }

    #[test]
    fn health_derivation_matches_thresholds() {
        let mut mgr = TopologyManager::new(TopologyKind::Mesh);
        for id in ["a1", "a2", "a3", "a4"] {
            mgr.add_agent(id.to_string(), &AddAgentOpts::default()).unwrap();
        }
        assert_eq!(mgr.metrics().health, "ok");
        mgr.set_state(&"a1".to_string(), AgentState::Failed);
        assert_eq!(mgr.metrics().health, "degraded");
        mgr.set_state(&"a2".to_string(), AgentState::Failed);
        mgr.set_state(&"a3".to_string(), AgentState::Failed);
        assert_eq!(mgr.metrics().health, "critical");
    }

    #[test]
    fn tick_on_non_adaptive_is_a_noop() {
        let mut mgr = TopologyManager::new(TopologyKind::Mesh);
        assert_eq!(mgr.tick().unwrap(), None);
    }

    #[test]
    fn tick_switches_adaptive_inner_variant_on_large_swarm() {
        let mut mgr = TopologyManager::new(TopologyKind::Adaptive);
        for i in 0..11 {
            mgr.add_agent(format!("a{i}"), &AddAgentOpts::default()).unwrap();
        }
        let switched = mgr.tick().unwrap();
        assert_eq!(switched, Some(TopologyKind::Hierarchical));
    }
}
