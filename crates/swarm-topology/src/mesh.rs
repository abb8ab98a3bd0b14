use crate::{AddAgentOpts, Topology, TopologyError, TopologyKind};
use std::collections::HashMap;
use swarm_types::{AgentId, AgentState, TopologyExtras};

/// Every pair of non-failed agents is connected; degree = n-1.
#[derive(Debug, Default)]
pub struct MeshTopology {
    states: HashMap<AgentId, AgentState>,
}

impl MeshTopology {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Topology for MeshTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Mesh
    }

    fn add_agent(&mut self, id: AgentId, _opts: &AddAgentOpts) -> Result<TopologyExtras, TopologyError> {
        if self.states.contains_key(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }
        self.states.insert(id, AgentState::Active);
        Ok(TopologyExtras::default())
    }

    fn remove_agent(&mut self, id: &AgentId) -> Result<(), TopologyError> {
        self.states.remove(id);
        Ok(())
    }

    fn set_state(&mut self, id: &AgentId, state: AgentState) {
        if let Some(s) = self.states.get_mut(id) {
            *s = state;
        }
    }

    fn neighbors_of(&self, id: &AgentId) -> Vec<AgentId> {
        if !self.states.contains_key(id) {
            return Vec::new();
        }
        self.states.keys().filter(|&other| other != id).cloned().collect()
    }

    fn extras_of(&self, _id: &AgentId) -> TopologyExtras {
        TopologyExtras::default()
    }

    fn connection_count(&self) -> usize {
        let n = self.states.len();
        if n < 2 {
            0
        } else {
            n * (n - 1) / 2
        }
    }

    fn agent_ids(&self) -> Vec<AgentId> {
        self.states.keys().cloned().collect()
    }

    fn broadcast_targets(&self, from_id: &AgentId) -> Vec<AgentId> {
        self.states
            .iter()
            .filter(|(id, state)| *id != from_id && **state != AgentState::Failed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn visualize(&self) -> String {
        let ids: Vec<&str> = self.states.keys().map(|s| s.as_str()).collect();
        format!("mesh({} agents, fully connected): {:?}", ids.len(), ids)
    }
}
