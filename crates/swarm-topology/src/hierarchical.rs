use crate::{AddAgentOpts, Topology, TopologyError, TopologyKind};
use std::collections::HashMap;
use swarm_types::{AgentId, AgentState, TopologyExtras};

/// Tree rooted at a designated agent; every non-root agent has exactly one
/// parent, and layer number equals distance from the root.
#[derive(Debug, Default)]
pub struct HierarchicalTopology {
    root: Option<AgentId>,
    parent: HashMap<AgentId, AgentId>,
    children: HashMap<AgentId, Vec<AgentId>>,
    states: HashMap<AgentId, AgentState>,
}

impl HierarchicalTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<&AgentId> {
        self.root.as_ref()
    }

    fn layer_of(&self, id: &AgentId) -> u32 {
        let mut depth = 0;
        let mut cur = id.clone();
        while let Some(p) = self.parent.get(&cur) {
            depth += 1;
            cur = p.clone();
            if depth as usize > self.parent.len() + 1 {
                break; // guards against a cycle slipping in; invariant forbids this
            }
        }
        depth
    }
}

impl Topology for HierarchicalTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Hierarchical
    }

    fn add_agent(&mut self, id: AgentId, opts: &AddAgentOpts) -> Result<TopologyExtras, TopologyError> {
        if self.states.contains_key(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }
        if self.root.is_none() {
            self.root = Some(id.clone());
            self.states.insert(id, AgentState::Active);
            return Ok(TopologyExtras { hierarchy_layer: Some(0), parent_id: None, ring_position: None });
        }
        let Some(parent_id) = opts.parent_id.clone() else {
            return Err(TopologyError::MissingParent(id));
        };
        if !self.states.contains_key(&parent_id) {
            return Err(TopologyError::UnknownParent { agent: id, parent: parent_id });
        }
        self.parent.insert(id.clone(), parent_id.clone());
        self.children.entry(parent_id.clone()).or_default().push(id.clone());
        self.states.insert(id.clone(), AgentState::Active);
        let layer = self.layer_of(&id);
        Ok(TopologyExtras { hierarchy_layer: Some(layer), parent_id: Some(parent_id), ring_position: None })
    }

    fn remove_agent(&mut self, id: &AgentId) -> Result<(), TopologyError> {
        let parent = self.parent.remove(id);
        let kids = self.children.remove(id).unwrap_or_default();

        // Reparent children to the removed node's grandparent (may be `None`
        // only if the removed node was the root, in which case the eldest
        // child, if any, becomes the new root).
        match &parent {
            Some(grandparent) => {
                for child in &kids {
                    self.parent.insert(child.clone(), grandparent.clone());
                }
                self.children.entry(grandparent.clone()).or_default().extend(kids.iter().cloned());
                if let Some(siblings) = self.children.get_mut(grandparent) {
                    siblings.retain(|c| c != id);
                }
            }
            None => {
                if self.root.as_ref() == Some(id) {
                    self.root = kids.first().cloned();
                    for child in kids.iter().skip(1) {
                        if let Some(new_root) = &self.root {
                            self.parent.insert(child.clone(), new_root.clone());
                            self.children.entry(new_root.clone()).or_default().push(child.clone());
                        }
                    }
                    if let Some(new_root) = &self.root {
                        self.parent.remove(new_root);
                    }
                }
            }
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
        let mut out = Vec::new();
        if let Some(p) = self.parent.get(id) {
            out.push(p.clone());
        }
        if let Some(kids) = self.children.get(id) {
            out.extend(kids.iter().cloned());
        }
        out
    }

    fn extras_of(&self, id: &AgentId) -> TopologyExtras {
        if !self.states.contains_key(id) {
            return TopologyExtras::default();
        }
        TopologyExtras { hierarchy_layer: Some(self.layer_of(id)), parent_id: self.parent.get(id).cloned(), ring_position: None }
    }

    fn connection_count(&self) -> usize {
        self.parent.len()
    }

    fn agent_ids(&self) -> Vec<AgentId> {
        self.states.keys().cloned().collect()
    }

    fn broadcast_targets(&self, from_id: &AgentId) -> Vec<AgentId> {
        // Delivery walks the whole tree from the root, skipping the sender
        // and failed agents, matching "non-failed agents reachable via the tree".
        let Some(root) = &self.root else { return Vec::new() };
        let mut out = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(cur) = stack.pop() {
            if &cur != from_id && self.states.get(&cur) != Some(&AgentState::Failed) {
                out.push(cur.clone());
            }
            if let Some(kids) = self.children.get(&cur) {
                stack.extend(kids.iter().cloned());
            }
        }
        out
    }

    fn visualize(&self) -> String {
        format!("hierarchical(root={:?}, edges={})", self.root, self.parent.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_opts(parent: &str) -> AddAgentOpts {
        AddAgentOpts { parent_id: Some(parent.to_string()), ..Default::default() }
    }

    #[test]
    fn layers_reflect_distance_from_root() {
        let mut t = HierarchicalTopology::new();
        let root_extras = t.add_agent("r".to_string(), &AddAgentOpts::default()).unwrap();
        assert_eq!(root_extras.hierarchy_layer, Some(0));
        let c1 = t.add_agent("c1".to_string(), &child_opts("r")).unwrap();
        assert_eq!(c1.hierarchy_layer, Some(1));
        t.add_agent("c2".to_string(), &child_opts("r")).unwrap();
        let g1 = t.add_agent("g1".to_string(), &child_opts("c1")).unwrap();
        assert_eq!(g1.hierarchy_layer, Some(2));
        t.add_agent("g2".to_string(), &child_opts("c1")).unwrap();
        assert_eq!(t.agent_ids().len(), 5);
    }

    #[test]
    fn non_root_without_parent_is_rejected() {
        let mut t = HierarchicalTopology::new();
        t.add_agent("r".to_string(), &AddAgentOpts::default()).unwrap();
        let err = t.add_agent("orphan".to_string(), &AddAgentOpts::default()).unwrap_err();
        assert!(matches!(err, TopologyError::MissingParent(_)));
    }

    #[test]
    fn removing_a_middle_node_reparents_children_to_grandparent() {
        let mut t = HierarchicalTopology::new();
        t.add_agent("r".to_string(), &AddAgentOpts::default()).unwrap();
        t.add_agent("c1".to_string(), &child_opts("r")).unwrap();
        t.add_agent("g1".to_string(), &child_opts("c1")).unwrap();
        t.remove_agent(&"c1".to_string()).unwrap();
        assert_eq!(t.neighbors_of(&"r".to_string()), vec!["g1".to_string()]);
    }
}
