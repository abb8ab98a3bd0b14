use crate::health::HealthState;
use crate::record::HeartbeatRecord;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use swarm_hooks::{HookContext, HookSystem};
use swarm_types::AgentId;
use tokio::sync::watch;
use tracing::{debug, info};

const DEFAULT_RING_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub threshold: f64,
    pub ring_capacity: usize,
    pub sweep_interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 5000, threshold: 5.0, ring_capacity: DEFAULT_RING_CAPACITY, sweep_interval_ms: 1000 }
    }
}

pub type AlertCallback = Arc<dyn Fn(&AgentId, HealthState, HealthState) + Send + Sync>;

#[derive(Default, Clone)]
struct AlertCallbacks {
    on_degraded: Option<AlertCallback>,
    on_critical: Option<AlertCallback>,
    on_failed: Option<AlertCallback>,
}

/// Tracks agent liveness: per-agent bounded history, on-demand health
/// classification, and a sweeper that dispatches `health_changed` hooks on
/// state transitions.
pub struct HeartbeatMonitor {
    records: Arc<DashMap<AgentId, Mutex<HeartbeatRecord>>>,
    default_config: HeartbeatConfig,
    alerts: Arc<Mutex<AlertCallbacks>>,
    hooks: Arc<HookSystem>,
    stop_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(default_config: HeartbeatConfig, hooks: Arc<HookSystem>) -> Arc<Self> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = Arc::new(Self {
            records: Arc::new(DashMap::new()),
            default_config,
            alerts: Arc::new(Mutex::new(AlertCallbacks::default())),
            hooks,
            stop_tx,
            sweeper: Mutex::new(None),
        });
        let handle = spawn_sweeper(monitor.clone(), stop_rx);
        *monitor.sweeper.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
        monitor
    }

    pub fn start_monitoring(&self, agent_id: AgentId, interval_ms: Option<u64>, threshold: Option<f64>) {
        let record = HeartbeatRecord::new(
            self.default_config.ring_capacity,
            interval_ms.unwrap_or(self.default_config.interval_ms),
            threshold.unwrap_or(self.default_config.threshold),
        );
        self.records.insert(agent_id, Mutex::new(record));
    }

    pub fn stop_monitoring(&self, agent_id: &AgentId) -> bool {
        self.records.remove(agent_id).is_some()
    }

    /// O(1), contends only on this agent's own record.
    pub fn record_heartbeat(&self, agent_id: &AgentId, metadata: Option<serde_json::Value>) -> bool {
        match self.records.get(agent_id) {
            Some(entry) => {
                entry.lock().unwrap_or_else(|p| p.into_inner()).record(metadata);
                true
            }
            None => false,
        }
    }

    pub fn check_agent_health(&self, agent_id: &AgentId) -> Option<HealthState> {
        self.records.get(agent_id).map(|e| e.lock().unwrap_or_else(|p| p.into_inner()).health())
    }

    pub fn get_unhealthy_agents(&self, min_state: HealthState) -> Vec<AgentId> {
        self.records
            .iter()
            .filter(|e| e.value().lock().unwrap_or_else(|p| p.into_inner()).health() >= min_state)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Read-only view of the ring buffer, newest last. `within` restricts the
    /// result to heartbeats younger than the given duration.
    pub fn get_heartbeat_history(&self, agent_id: &AgentId, within: Option<Duration>) -> Vec<std::time::Instant> {
        self.records
            .get(agent_id)
            .map(|e| {
                e.lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .history()
                    .map(|h| h.at)
                    .filter(|at| within.map(|w| at.elapsed() <= w).unwrap_or(true))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn configure_alerts(&self, on_degraded: Option<AlertCallback>, on_critical: Option<AlertCallback>, on_failed: Option<AlertCallback>) {
        let mut alerts = self.alerts.lock().unwrap_or_else(|p| p.into_inner());
        alerts.on_degraded = on_degraded;
        alerts.on_critical = on_critical;
        alerts.on_failed = on_failed;
    }

    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.sweeper.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }

    /// Iteration is in a fixed key order (sorted) so the sweeper never
    /// contends with `record_heartbeat` on more than one agent's lock at a
    /// time in an unpredictable order.
    fn sweep(&self) {
        let mut ids: Vec<AgentId> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        for id in ids {
            let Some(entry) = self.records.get(&id) else { continue };
            let (previous, current) = {
                let mut record = entry.value().lock().unwrap_or_else(|p| p.into_inner());
                let current = record.health();
                let previous = record.last_health;
                record.last_health = current;
                (previous, current)
            };
            if previous == current {
                continue;
            }
            debug!(agent_id = %id, from = previous.as_str(), to = current.as_str(), "agent health transitioned");
            self.invoke_alert(&id, previous, current);
            self.fire_health_changed(&id, previous, current);
        }
    }

    fn invoke_alert(&self, id: &AgentId, previous: HealthState, current: HealthState) {
        let alerts = self.alerts.lock().unwrap_or_else(|p| p.into_inner()).clone();
        let callback = match current {
            HealthState::Degraded => alerts.on_degraded,
            HealthState::Critical => alerts.on_critical,
            HealthState::Failed => alerts.on_failed,
            HealthState::Healthy => None,
        };
        if let Some(cb) = callback {
            cb(id, previous, current);
        }
    }

    fn fire_health_changed(&self, id: &AgentId, previous: HealthState, current: HealthState) {
        let hooks = self.hooks.clone();
        let id = id.clone();
        let payload = json!({
            "agent_id": id,
            "previous": previous.as_str(),
            "current": current.as_str(),
        });
        tokio::spawn(async move {
            let ctx = HookContext::new("health_changed", payload).with_source(id);
            let _ = hooks.fire("health_changed", ctx).await;
        });
    }
}

fn spawn_sweeper(monitor: Arc<HeartbeatMonitor>, mut stop_rx: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
    let interval_ms = monitor.default_config.sweep_interval_ms;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => monitor.sweep(),
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        info!("heartbeat sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_hooks::HooksConfig;

    fn monitor() -> Arc<HeartbeatMonitor> {
        let hooks = Arc::new(HookSystem::new(HooksConfig::default()));
        HeartbeatMonitor::new(HeartbeatConfig { interval_ms: 50, threshold: 5.0, ring_capacity: 10, sweep_interval_ms: 20 }, hooks)
    }

    #[tokio::test]
    async fn record_and_check_health_round_trips() {
        let m = monitor();
        m.start_monitoring("a1".to_string(), None, None);
        assert!(m.record_heartbeat(&"a1".to_string(), None));
        assert_eq!(m.check_agent_health(&"a1".to_string()), Some(HealthState::Healthy));
        m.shutdown();
    }

    #[tokio::test]
    async fn unmonitored_agent_returns_none() {
        let m = monitor();
        assert_eq!(m.check_agent_health(&"ghost".to_string()), None);
        assert!(!m.record_heartbeat(&"ghost".to_string(), None));
        m.shutdown();
    }

    #[tokio::test]
    async fn stop_monitoring_is_idempotent() {
        let m = monitor();
        m.start_monitoring("a1".to_string(), None, None);
        assert!(m.stop_monitoring(&"a1".to_string()));
        assert!(!m.stop_monitoring(&"a1".to_string()));
        m.shutdown();
    }

    #[tokio::test]
    async fn sweeper_marks_stale_agent_unhealthy() {
        let m = monitor();
        m.start_monitoring("a1".to_string(), Some(10), Some(3.0));
        m.record_heartbeat(&"a1".to_string(), None);
        tokio::time::sleep(Duration::from_millis(150)).await;
        let unhealthy = m.get_unhealthy_agents(HealthState::Degraded);
        assert!(unhealthy.contains(&"a1".to_string()));
        m.shutdown();
    }
}
