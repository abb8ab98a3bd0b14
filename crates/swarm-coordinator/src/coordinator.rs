use crate::config::SwarmConfig;
use crate::error::CoordinatorError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use swarm_consensus::{ConsensusEngine, ConsensusResult};
use swarm_heartbeat::HeartbeatMonitor;
use swarm_hooks::{HookContext, HookSystem, HooksConfig};
use swarm_metrics::{BottleneckDetector, MetricsCollector, ResourceSnapshot};
use swarm_store::Store;
use swarm_topology::{AddAgentOpts, TopologyKind, TopologyManager, TopologyMetrics};
use swarm_types::{Agent, AgentId, AgentSnapshot, AgentState, Message, MessageTarget, Metadata, SyncStateEntry};
use tracing::info;

const SELF_NODE_ID: &str = "__coordinator__";

struct Inner {
    agents: HashMap<AgentId, Agent>,
    topology: TopologyManager,
    sync_state: HashMap<String, SyncStateEntry>,
}

/// Single entry point composing the agent registry, topology, hook
/// dispatcher, heartbeat monitor, metrics/bottleneck engine, and consensus
/// engine. One lock guards the agent registry and topology
/// graph jointly, since every mutation touches both; it is never held across
/// an awaited hook dispatch.
pub struct SwarmCoordinator {
    inner: Mutex<Inner>,
    hooks: Arc<HookSystem>,
    heartbeat: Arc<HeartbeatMonitor>,
    metrics: Arc<MetricsCollector>,
    bottleneck: Arc<BottleneckDetector>,
    consensus: Arc<ConsensusEngine>,
    store: Option<Arc<Store>>,
    logical_clock: AtomicU64,
}

impl SwarmCoordinator {
    pub fn new(config: SwarmConfig) -> Result<Arc<Self>, CoordinatorError> {
        let store = match &config.store_path {
            Some(path) => Some(Arc::new(Store::open(path)?)),
            None => None,
        };
        let hooks_config: HooksConfig = config.hooks.clone().into();
        let hooks = Arc::new(HookSystem::new(hooks_config));
        let heartbeat = HeartbeatMonitor::new(config.heartbeat.clone().into(), hooks.clone());
        let metrics = Arc::new(if config.metrics_async {
            MetricsCollector::new_async_with_capacity(store.clone(), config.metrics_queue_capacity)
        } else {
            MetricsCollector::new_sync(store.clone())
        });
        let bottleneck = BottleneckDetector::new(metrics.clone(), hooks.clone());
        let consensus = ConsensusEngine::new(SELF_NODE_ID, config.consensus.clone().into(), hooks.clone());
        let topology = TopologyManager::new(config.topology_kind());

        let coordinator = Arc::new(Self {
            inner: Mutex::new(Inner { agents: HashMap::new(), topology, sync_state: HashMap::new() }),
            hooks,
            heartbeat,
            metrics,
            bottleneck,
            consensus,
            store,
            logical_clock: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&coordinator);
        coordinator.bottleneck.clone().monitor_continuously(config.bottleneck_interval_ms, move || match weak.upgrade() {
            Some(c) => c.resource_snapshot(),
            None => (ResourceSnapshot::default(), Vec::new()),
        });

        Ok(coordinator)
    }

    fn resource_snapshot(&self) -> (ResourceSnapshot, Vec<AgentId>) {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let ids: Vec<AgentId> = inner.agents.keys().cloned().collect();
        (ResourceSnapshot::default(), ids)
    }

    fn next_logical_ts(&self) -> u64 {
        self.logical_clock.fetch_add(1, Ordering::SeqCst)
    }

    async fn fire(&self, event_type: &str, payload: Value, source: Option<&AgentId>) {
        let mut ctx = HookContext::new(event_type, payload);
        if let Some(id) = source {
            ctx = ctx.with_source(id.clone());
        }
        if let Err(e) = self.hooks.fire(event_type, ctx).await {
            tracing::warn!(event_type, error = %e, "hook dispatch failed");
        }
    }

    /// Fails with `DuplicateAgent` on ID collision; not idempotent.
    pub async fn register_agent(&self, id: impl Into<AgentId>, agent_type: impl Into<String>, metadata: Metadata) -> Result<bool, CoordinatorError> {
        self.register_agent_with_parent(id, agent_type, metadata, None).await
    }

    /// Like `register_agent`, but lets the caller attach `parent` — required
    /// for every non-root agent under a hierarchical topology.
    pub async fn register_agent_with_parent(
        &self,
        id: impl Into<AgentId>,
        agent_type: impl Into<String>,
        metadata: Metadata,
        parent: Option<AgentId>,
    ) -> Result<bool, CoordinatorError> {
        let id = id.into();
        let agent_type = agent_type.into();
        {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if inner.agents.contains_key(&id) {
                return Err(CoordinatorError::DuplicateAgent(id));
            }
            let opts = AddAgentOpts { parent_id: parent, ..Default::default() };
            let extras = inner.topology.add_agent(id.clone(), &opts)?;
            let mut agent = Agent::new(id.clone(), agent_type.clone(), metadata);
            agent.topology = extras;
            inner.agents.insert(id.clone(), agent);
        }
        self.heartbeat.start_monitoring(id.clone(), None, None);
        self.fire("agent_spawn", serde_json::json!({ "agent_id": id, "agent_type": agent_type }), Some(&id)).await;
        Ok(true)
    }

    /// Idempotent: returns `false` if `id` was never registered. Any
    /// hierarchical children of `id` are reparented by the topology and their
    /// cached extras refreshed to match.
    pub async fn unregister_agent(&self, id: &AgentId) -> Result<bool, CoordinatorError> {
        let removed = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if inner.agents.remove(id).is_none() {
                false
            } else {
                inner.topology.remove_agent(id)?;
                let remaining: Vec<AgentId> = inner.agents.keys().cloned().collect();
                for other in remaining {
                    let extras = inner.topology.extras_of(&other);
                    if let Some(agent) = inner.agents.get_mut(&other) {
                        agent.topology = extras;
                    }
                }
                true
            }
        };
        if !removed {
            return Ok(false);
        }
        self.heartbeat.stop_monitoring(id);
        self.fire("agent_unregister", serde_json::json!({ "agent_id": id }), Some(id)).await;
        Ok(true)
    }

    /// Fails with `UnknownAgent` if either ID is unregistered, or returns
    /// `Ok(false)` if the sender is `FAILED`.
    pub async fn send_message(&self, from_id: &AgentId, to_id: &AgentId, payload: Value) -> Result<bool, CoordinatorError> {
        let ts = self.next_logical_ts();
        {
            let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let sender = inner.agents.get(from_id).ok_or_else(|| CoordinatorError::UnknownAgent(from_id.clone()))?;
            if !inner.agents.contains_key(to_id) {
                return Err(CoordinatorError::UnknownAgent(to_id.clone()));
            }
            if sender.state == AgentState::Failed {
                return Ok(false);
            }
        }
        let message = Message::new(from_id.clone(), MessageTarget::Agent(to_id.clone()), payload.clone(), ts);
        self.fire("pre_send", serde_json::json!({ "from": message.from, "to": to_id, "payload": message.payload }), Some(from_id)).await;
        {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.topology.record_message(from_id, to_id);
        }
        self.heartbeat.record_heartbeat(from_id, None);
        self.fire("post_send", serde_json::json!({ "from": message.from, "to": to_id }), Some(from_id)).await;
        Ok(true)
    }

    /// Returns the number of recipients reached, per the topology's
    /// `broadcast_targets` (honoring `exclude`).
    pub async fn broadcast_message(&self, from_id: &AgentId, payload: Value, exclude: Option<&[AgentId]>) -> Result<usize, CoordinatorError> {
        let targets = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if !inner.agents.contains_key(from_id) {
                return Err(CoordinatorError::UnknownAgent(from_id.clone()));
            }
            let mut targets = inner.topology.broadcast_targets(from_id);
            if let Some(exclude) = exclude {
                targets.retain(|id| !exclude.contains(id));
            }
            inner.topology.record_broadcast(targets.len());
            targets
        };
        self.fire("pre_send", serde_json::json!({ "from": from_id, "broadcast": true, "recipients": targets.len() }), Some(from_id)).await;
        Ok(targets.len())
    }

    /// Valid transitions: any -> any except `FAILED -> anything`, which is
    /// only reachable via `update_agent_heartbeat`'s recovery path.
    pub fn set_agent_state(&self, id: &AgentId, state: AgentState) -> Result<bool, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let agent = inner.agents.get(id).ok_or_else(|| CoordinatorError::UnknownAgent(id.clone()))?;
        if !agent.state.settable_from(state) {
            return Err(CoordinatorError::InvalidState { agent: id.clone(), from: agent.state.to_string(), to: state.to_string() });
        }
        inner.topology.set_state(id, state);
        inner.agents.get_mut(id).expect("checked above").state = state;
        Ok(true)
    }

    /// Delegates to the heartbeat monitor; this is the one path that may
    /// transition `FAILED -> ACTIVE`.
    pub fn update_agent_heartbeat(&self, id: &AgentId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let Some(agent) = inner.agents.get_mut(id) else { return false };
        agent.touch();
        if agent.state == AgentState::Failed {
            agent.state = AgentState::Active;
            inner.topology.set_state(id, AgentState::Active);
        }
        drop(inner);
        self.heartbeat.record_heartbeat(id, None)
    }

    pub fn get_agent_status(&self, id: &AgentId) -> Option<AgentSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.agents.get(id).map(AgentSnapshot::from)
    }

    pub fn get_topology_info(&self) -> TopologyMetrics {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).topology.metrics()
    }

    pub fn switch_topology(&self, new_kind: TopologyKind) -> Result<bool, CoordinatorError> {
        Ok(self.inner.lock().unwrap_or_else(|p| p.into_inner()).topology.switch_topology(new_kind)?)
    }

    /// Runs one topology scheduler tick (only meaningful under `Adaptive`).
    pub fn tick_topology(&self) -> Result<Option<TopologyKind>, CoordinatorError> {
        Ok(self.inner.lock().unwrap_or_else(|p| p.into_inner()).topology.tick()?)
    }

    pub async fn request_consensus(&self, proposal: Value, timeout_ms: u64) -> ConsensusResult {
        let (active, total) = {
            let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let active: Vec<AgentId> = inner.agents.iter().filter(|(_, a)| a.state != AgentState::Failed).map(|(id, _)| id.clone()).collect();
            (active, inner.agents.len())
        };
        match self.consensus.elect_leader(&active, total).await {
            Ok(leader) => {
                self.consensus.fire_leader_changed(&leader);
                self.consensus.propose(proposal, &active, total, timeout_ms).await
            }
            Err(e) => swarm_consensus::ConsensusResult {
                decision: swarm_consensus::Decision::Timeout,
                votes_for: 0,
                votes_against: 0,
                abstain: active.len(),
                threshold: total / 2 + 1,
                participants: active.len(),
                metadata: HashMap::from([("reason".to_string(), serde_json::json!(e.to_string()))]),
            },
        }
    }

    /// Increments the key's version and records `writer` as `last_writer`.
    pub async fn synchronize_state(&self, writer: &AgentId, key: &str, value: Value) -> bool {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let next = match inner.sync_state.get(key) {
                Some(existing) => existing.next(value, writer.clone()),
                None => SyncStateEntry::first(value, writer.clone()),
            };
            inner.sync_state.insert(key.to_string(), next);
        }
        self.fire("state_synchronized", serde_json::json!({ "key": key }), Some(writer)).await;
        true
    }

    pub fn get_synchronized_state(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).sync_state.get(key).map(|e| e.value.clone())
    }

    pub fn hooks(&self) -> &Arc<HookSystem> {
        &self.hooks
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn heartbeat(&self) -> &Arc<HeartbeatMonitor> {
        &self.heartbeat
    }

    pub fn consensus(&self) -> &Arc<ConsensusEngine> {
        &self.consensus
    }

    /// Idempotent, synchronous: stops every background worker and waits for
    /// them to drain.
    pub async fn shutdown(&self) {
        info!("swarm coordinator shutting down");
        self.bottleneck.stop_monitoring();
        self.heartbeat.shutdown();
        self.consensus.shutdown();
        self.metrics.shutdown().await;
        if let Some(store) = &self.store {
            let _ = store.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwarmConfig;

    fn coordinator() -> Arc<SwarmCoordinator> {
        SwarmCoordinator::new(SwarmConfig { metrics_async: false, ..Default::default() }).unwrap()
    }

    #[tokio::test]
    async fn register_then_duplicate_fails() {
        let c = coordinator();
        assert!(c.register_agent("a1", "worker", Metadata::new()).await.unwrap());
        let err = c.register_agent("a1", "worker", Metadata::new()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::DuplicateAgent(_)));
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let c = coordinator();
        c.register_agent("a1", "worker", Metadata::new()).await.unwrap();
        assert!(c.unregister_agent(&"a1".to_string()).await.unwrap());
        assert!(!c.unregister_agent(&"a1".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn failed_sender_cannot_send() {
        let c = coordinator();
        c.register_agent("a1", "worker", Metadata::new()).await.unwrap();
        c.register_agent("a2", "worker", Metadata::new()).await.unwrap();
        c.set_agent_state(&"a1".to_string(), AgentState::Failed).unwrap();
        let sent = c.send_message(&"a1".to_string(), &"a2".to_string(), serde_json::json!({})).await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn heartbeat_recovers_failed_agent() {
        let c = coordinator();
        c.register_agent("a1", "worker", Metadata::new()).await.unwrap();
        c.set_agent_state(&"a1".to_string(), AgentState::Failed).unwrap();
        assert!(c.update_agent_heartbeat(&"a1".to_string()));
        assert_eq!(c.get_agent_status(&"a1".to_string()).unwrap().state, AgentState::Active);
    }

    #[tokio::test]
    async fn synchronize_state_versions_increase() {
        let c = coordinator();
        c.register_agent("a1", "worker", Metadata::new()).await.unwrap();
        assert!(c.synchronize_state(&"a1".to_string(), "k", serde_json::json!(1)).await);
        assert!(c.synchronize_state(&"a1".to_string(), "k", serde_json::json!(2)).await);
        assert_eq!(c.get_synchronized_state("k"), Some(serde_json::json!(2)));
    }
}
