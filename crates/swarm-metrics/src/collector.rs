use crate::reservoir::Reservoir;
use crate::types::{AgentMetric, AgentPerformance, SwarmMetric, TaskMetric, TaskResult, TaskStats};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swarm_store::Store;
use swarm_types::AgentId;
use tokio::sync::mpsc;
use tokio::time::Instant as TokioInstant;
use tracing::warn;

const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
const BATCH_SIZE: usize = 64;
const BATCH_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const RESERVOIR_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub enum MetricEvent {
    Task(TaskMetric),
    Agent(AgentMetric),
    Swarm(SwarmMetric),
}

struct AgentStats {
    durations: Reservoir,
    successes: u64,
    failures: u64,
    total_tokens: u64,
}

impl AgentStats {
    fn new() -> Self {
        Self { durations: Reservoir::new(RESERVOIR_CAPACITY), successes: 0, failures: 0, total_tokens: 0 }
    }

    fn record(&mut self, m: &TaskMetric) {
        self.durations.push(m.duration_ms as f64);
        if m.result == TaskResult::Success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_tokens += m.tokens_used.unwrap_or(0);
    }

    fn count(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Accepts task/agent/swarm metric submissions and computes summary
/// statistics on demand.
pub struct MetricsCollector {
    queue_tx: Mutex<Option<mpsc::Sender<MetricEvent>>>,
    per_agent: Arc<DashMap<AgentId, Mutex<AgentStats>>>,
    dropped: Arc<AtomicU64>,
    store: Option<Arc<Store>>,
    drain_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MetricsCollector {
    /// Async mode (default): a bounded queue absorbs submissions; a single
    /// worker batches and persists them without blocking producers.
    pub fn new_async(store: Option<Arc<Store>>) -> Self {
        Self::new_async_with_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn new_async_with_capacity(store: Option<Arc<Store>>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let per_agent: Arc<DashMap<AgentId, Mutex<AgentStats>>> = Arc::new(DashMap::new());
        let dropped = Arc::new(AtomicU64::new(0));
        let handle = spawn_drain_worker(rx, per_agent.clone(), store.clone());
        Self { queue_tx: Mutex::new(Some(tx)), per_agent, dropped, store, drain_handle: Mutex::new(Some(handle)) }
    }

    /// Sync mode: every call updates in-memory stats and persists inline.
    pub fn new_sync(store: Option<Arc<Store>>) -> Self {
        Self { queue_tx: Mutex::new(None), per_agent: Arc::new(DashMap::new()), dropped: Arc::new(AtomicU64::new(0)), store, drain_handle: Mutex::new(None) }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn sender(&self) -> Option<mpsc::Sender<MetricEvent>> {
        self.queue_tx.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn record_task_metric(&self, metric: TaskMetric) {
        match self.sender() {
            Some(tx) => {
                if tx.try_send(MetricEvent::Task(metric)).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                apply_task(&self.per_agent, &metric);
                if let Some(store) = &self.store {
                    persist_task(store, &metric);
                }
            }
        }
    }

    pub fn record_agent_metric(&self, metric: AgentMetric) {
        match self.sender() {
            Some(tx) => {
                if tx.try_send(MetricEvent::Agent(metric)).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                if let Some(store) = &self.store {
                    persist_agent(store, &metric);
                }
            }
        }
    }

    pub fn record_swarm_metric(&self, metric: SwarmMetric) {
        match self.sender() {
            Some(tx) => {
                if tx.try_send(MetricEvent::Swarm(metric)).is_err() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                if let Some(store) = &self.store {
                    persist_swarm(store, &metric);
                }
            }
        }
    }

    pub fn get_task_stats(&self, agent_id: Option<&AgentId>) -> TaskStats {
        match agent_id {
            Some(id) => match self.per_agent.get(id) {
                Some(entry) => stats_from(&entry.lock().unwrap_or_else(|p| p.into_inner())),
                None => TaskStats::default(),
            },
            None => {
                let mut combined = Reservoir::new(RESERVOIR_CAPACITY * self.per_agent.len().max(1));
                let mut successes = 0u64;
                let mut failures = 0u64;
                let mut total_tokens = 0u64;
                for entry in self.per_agent.iter() {
                    let stats = entry.value().lock().unwrap_or_else(|p| p.into_inner());
                    for s in stats.durations.samples() {
                        combined.push(*s);
                    }
                    successes += stats.successes;
                    failures += stats.failures;
                    total_tokens += stats.total_tokens;
                }
                let count = successes + failures;
                TaskStats {
                    count: count as usize,
                    success_rate: if count == 0 { 0.0 } else { successes as f64 / count as f64 },
                    avg_duration_ms: combined.mean(),
                    p50: combined.percentile(50.0),
                    p95: combined.percentile(95.0),
                    p99: combined.percentile(99.0),
                    total_tokens,
                }
            }
        }
    }

    pub fn get_agent_performance(&self, agent_id: &AgentId) -> AgentPerformance {
        match self.per_agent.get(agent_id) {
            Some(entry) => {
                let stats = entry.lock().unwrap_or_else(|p| p.into_inner());
                let count = stats.count();
                AgentPerformance {
                    avg_duration_ms: stats.durations.mean(),
                    success_rate: if count == 0 { 0.0 } else { stats.successes as f64 / count as f64 },
                    error_rate: if count == 0 { 0.0 } else { stats.failures as f64 / count as f64 },
                    task_count: count as usize,
                }
            }
            None => AgentPerformance::default(),
        }
    }

    /// Drops the sender so the drain worker sees the channel close, then
    /// waits up to the grace period for it to flush and exit.
    pub async fn shutdown(&self) {
        self.queue_tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = self.drain_handle.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
        }
    }
}

fn stats_from(stats: &AgentStats) -> TaskStats {
    let count = stats.count();
    TaskStats {
        count: count as usize,
        success_rate: if count == 0 { 0.0 } else { stats.successes as f64 / count as f64 },
        avg_duration_ms: stats.durations.mean(),
        p50: stats.durations.percentile(50.0),
        p95: stats.durations.percentile(95.0),
        p99: stats.durations.percentile(99.0),
        total_tokens: stats.total_tokens,
    }
}

fn apply_task(per_agent: &DashMap<AgentId, Mutex<AgentStats>>, metric: &TaskMetric) {
    per_agent.entry(metric.agent_id.clone()).or_insert_with(|| Mutex::new(AgentStats::new())).lock().unwrap_or_else(|p| p.into_inner()).record(metric);
}

fn persist_task(store: &Arc<Store>, m: &TaskMetric) {
    let tags = serde_json::to_string(&m.tags).unwrap_or_else(|_| "{}".to_string());
    let result = store.execute(
        "INSERT INTO task_metrics (task_id, agent_id, duration_ms, result, tokens, files_changed, timestamp, tags) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &[
            &m.task_id,
            &m.agent_id,
            &(m.duration_ms as i64),
            &m.result.as_str(),
            &m.tokens_used.map(|v| v as i64),
            &m.files_changed.map(|v| v as i64),
            &chrono::Utc::now().to_rfc3339(),
            &tags,
        ],
    );
    if let Err(e) = result {
        warn!(error = %e, "failed to persist task metric");
    }
}

fn persist_agent(store: &Arc<Store>, m: &AgentMetric) {
    let result = store.execute(
        "INSERT INTO agent_metrics (agent_id, metric_type, value, timestamp) VALUES (?1, ?2, ?3, ?4)",
        &[&m.agent_id, &m.metric_type, &m.value, &chrono::Utc::now().to_rfc3339()],
    );
    if let Err(e) = result {
        warn!(error = %e, "failed to persist agent metric");
    }
}

fn persist_swarm(store: &Arc<Store>, m: &SwarmMetric) {
    let result = store.execute(
        "INSERT INTO swarm_metrics (swarm_id, metric_type, value, timestamp) VALUES (?1, ?2, ?3, ?4)",
        &[&m.swarm_id, &m.metric_type, &m.value, &chrono::Utc::now().to_rfc3339()],
    );
    if let Err(e) = result {
        warn!(error = %e, "failed to persist swarm metric");
    }
}

fn spawn_drain_worker(
    mut rx: mpsc::Receiver<MetricEvent>,
    per_agent: Arc<DashMap<AgentId, Mutex<AgentStats>>>,
    store: Option<Arc<Store>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut deadline = TokioInstant::now() + BATCH_INTERVAL;
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            batch.push(event);
                            if batch.len() >= BATCH_SIZE {
                                flush(&mut batch, &per_agent, &store);
                                deadline = TokioInstant::now() + BATCH_INTERVAL;
                            }
                        }
                        None => {
                            flush(&mut batch, &per_agent, &store);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    flush(&mut batch, &per_agent, &store);
                    deadline = TokioInstant::now() + BATCH_INTERVAL;
                }
            }
        }
    })
}

fn flush(batch: &mut Vec<MetricEvent>, per_agent: &DashMap<AgentId, Mutex<AgentStats>>, store: &Option<Arc<Store>>) {
    if batch.is_empty() {
        return;
    }
    for event in batch.drain(..) {
        match event {
            MetricEvent::Task(m) => {
                apply_task(per_agent, &m);
                if let Some(store) = store {
                    persist_task(store, &m);
                }
            }
            MetricEvent::Agent(m) => {
                if let Some(store) = store {
                    persist_agent(store, &m);
                }
            }
            MetricEvent::Swarm(m) => {
                if let Some(store) = store {
                    persist_swarm(store, &m);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn task(agent: &str, duration_ms: u64, result: TaskResult) -> TaskMetric {
        TaskMetric {
            task_id: "t1".to_string(),
            agent_id: agent.to_string(),
            duration_ms,
            result,
            tokens_used: Some(10),
            files_changed: None,
            tags: HashMap::new(),
            recorded_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn sync_mode_updates_stats_immediately() {
        let c = MetricsCollector::new_sync(None);
        c.record_task_metric(task("a1", 100, TaskResult::Success));
        let stats = c.get_agent_performance(&"a1".to_string());
        assert_eq!(stats.task_count, 1);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[tokio::test]
    async fn async_mode_drains_before_shutdown_completes() {
        let c = MetricsCollector::new_async(None);
        for i in 0..10 {
            c.record_task_metric(task("a1", 50 + i, TaskResult::Success));
        }
        c.shutdown().await;
        let stats = c.get_agent_performance(&"a1".to_string());
        assert_eq!(stats.task_count, 10);
    }

    #[tokio::test]
    async fn aggregate_stats_combine_all_agents() {
        let c = MetricsCollector::new_sync(None);
        c.record_task_metric(task("a1", 100, TaskResult::Success));
        c.record_task_metric(task("a2", 200, TaskResult::Failure));
        let stats = c.get_task_stats(None);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.success_rate, 0.5);
    }

    #[tokio::test]
    async fn queue_full_drops_without_blocking() {
        let c = MetricsCollector::new_async_with_capacity(None, 1);
        for i in 0..50 {
            c.record_task_metric(task("a1", i, TaskResult::Success));
        }
        c.shutdown().await;
        assert!(c.dropped_count() <= 50);
    }
}
