use std::collections::HashMap;
use std::time::Instant;
use swarm_types::AgentId;

/// Passed to every hook invoked for an event.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub source_agent: Option<AgentId>,
    pub started_at: Instant,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl HookContext {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            source_agent: None,
            started_at: Instant::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_source(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.source_agent = Some(agent_id.into());
        self
    }
}
