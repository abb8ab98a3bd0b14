use crate::{AddAgentOpts, Topology, TopologyError, TopologyKind};
use std::collections::HashMap;
use swarm_types::{AgentId, AgentState, TopologyExtras};

/// Hamiltonian cycle in registration order; removing an agent splices the
/// gap so the cycle remains closed.
#[derive(Debug, Default)]
pub struct RingTopology {
    order: Vec<AgentId>,
    states: HashMap<AgentId, AgentState>,
}

impl RingTopology {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: &AgentId) -> Option<usize> {
        self.order.iter().position(|a| a == id)
    }
}

impl Topology for RingTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Ring
    }

    fn add_agent(&mut self, id: AgentId, _opts: &AddAgentOpts) -> Result<TopologyExtras, TopologyError> {
        if self.states.contains_key(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }
        self.states.insert(id.clone(), AgentState::Active);
        self.order.push(id);
        Ok(TopologyExtras { ring_position: Some(self.order.len() - 1), ..Default::default() })
    }

    fn remove_agent(&mut self, id: &AgentId) -> Result<(), TopologyError> {
        if let Some(pos) = self.position(id) {
            self.order.remove(pos);
        }
        self.states.remove(id);
        Ok(())
    }

    fn set_state(&mut self, id: &AgentId, state: AgentState) {
        if let Some(s) = self.states.get_mut(id) {
            *s = state;
        }
    }

    fn neighbors_of(&self, id: &AgentId) -> Vec<AgentId> {
        let n = self.order.len();
        let Some(pos) = self.position(id) else { return Vec::new() };
        if n < 2 {
            return Vec::new();
        }
        if n == 2 {
            return vec![self.order[(pos + 1) % n].clone()];
        }
        let prev = self.order[(pos + n - 1) % n].clone();
        let next = self.order[(pos + 1) % n].clone();
        vec![prev, next]
    }

    fn extras_of(&self, id: &AgentId) -> TopologyExtras {
        TopologyExtras { ring_position: self.position(id), ..Default::default() }
    }

    fn connection_count(&self) -> usize {
        let n = self.order.len();
        match n {
            0 | 1 => 0,
            2 => 1,
            _ => n,
        }
    }

    fn agent_ids(&self) -> Vec<AgentId> {
        self.order.clone()
    }

    fn broadcast_targets(&self, from_id: &AgentId) -> Vec<AgentId> {
        self.order
            .iter()
            .filter(|id| *id != from_id && self.states.get(*id) != Some(&AgentState::Failed))
            .cloned()
            .collect()
    }

    fn visualize(&self) -> String {
        format!("ring({:?})", self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forms_hamiltonian_cycle() {
        let mut t = RingTopology::new();
        for id in ["a1", "a2", "a3", "a4"] {
            t.add_agent(id.to_string(), &AddAgentOpts::default()).unwrap();
        }
        assert_eq!(t.connection_count(), 4);
        assert_eq!(t.neighbors_of(&"a1".to_string()), vec!["a4".to_string(), "a2".to_string()]);
    }

    #[test]
    fn removal_splices_the_gap() {
        let mut t = RingTopology::new();
        for id in ["a1", "a2", "a3", "a4"] {
            t.add_agent(id.to_string(), &AddAgentOpts::default()).unwrap();
        }
        t.remove_agent(&"a2".to_string()).unwrap();
        assert_eq!(t.neighbors_of(&"a1".to_string()), vec!["a4".to_string(), "a3".to_string()]);
        assert_eq!(t.connection_count(), 3);
    }
}
