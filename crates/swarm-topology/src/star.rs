use crate::{AddAgentOpts, Topology, TopologyError, TopologyKind};
use std::collections::HashMap;
use swarm_types::{AgentId, AgentState, TopologyExtras};

/// One hub agent connected to every spoke. The hub is the first agent
/// registered unless an explicit replacement is requested.
#[derive(Debug, Default)]
pub struct StarTopology {
    hub: Option<AgentId>,
    states: HashMap<AgentId, AgentState>,
}

impl StarTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> Option<&AgentId> {
        self.hub.as_ref()
    }
}

impl Topology for StarTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Star
    }

    fn add_agent(&mut self, id: AgentId, opts: &AddAgentOpts) -> Result<TopologyExtras, TopologyError> {
        if self.states.contains_key(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }
        if self.hub.is_none() {
            self.hub = Some(id.clone());
        } else if opts.make_hub {
            self.hub = Some(id.clone());
        }
        self.states.insert(id, AgentState::Active);
        Ok(TopologyExtras::default())
    }

    fn remove_agent(&mut self, id: &AgentId) -> Result<(), TopologyError> {
        self.states.remove(id);
        if self.hub.as_ref() == Some(id) {
            // Promote the lexicographically smallest remaining agent so the
            // choice is deterministic rather than HashMap-iteration-order.
            self.hub = self.states.keys().min().cloned();
        }
        Ok(())
    }

    fn set_state(&mut self, id: &AgentId, state: AgentState) {
        if let Some(s) = self.states.get_mut(id) {
            *s = state;
        }
    }

    fn neighbors_of(&self, id: &AgentId) -> Vec<AgentId> {
        match &self.hub {
            Some(hub) if hub == id => self.states.keys().filter(|&other| other != id).cloned().collect(),
            Some(hub) if self.states.contains_key(id) => vec![hub.clone()],
            _ => Vec::new(),
        }
    }

    fn extras_of(&self, _id: &AgentId) -> TopologyExtras {
        TopologyExtras::default()
    }

    fn connection_count(&self) -> usize {
        if self.hub.is_some() {
            self.states.len().saturating_sub(1)
        } else {
            0
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
        format!("star(hub={:?}, spokes={})", self.hub, self.states.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_registered_agent_becomes_hub() {
        let mut t = StarTopology::new();
        t.add_agent("a1".to_string(), &AddAgentOpts::default()).unwrap();
        t.add_agent("a2".to_string(), &AddAgentOpts::default()).unwrap();
        assert_eq!(t.hub(), Some(&"a1".to_string()));
        assert_eq!(t.connection_count(), 1);
    }

    #[test]
    fn explicit_replacement_changes_hub() {
        let mut t = StarTopology::new();
        t.add_agent("a1".to_string(), &AddAgentOpts::default()).unwrap();
        t.add_agent("a2".to_string(), &AddAgentOpts { make_hub: true, ..Default::default() }).unwrap();
        assert_eq!(t.hub(), Some(&"a2".to_string()));
    }

    #[test]
    fn removing_hub_promotes_a_replacement() {
        let mut t = StarTopology::new();
        t.add_agent("a1".to_string(), &AddAgentOpts::default()).unwrap();
        t.add_agent("a2".to_string(), &AddAgentOpts::default()).unwrap();
        t.remove_agent(&"a1".to_string()).unwrap();
        assert_eq!(t.hub(), Some(&"a2".to_string()));
    }
}
