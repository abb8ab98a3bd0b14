use crate::collector::MetricsCollector;
use crate::reservoir::classify_trend;
use crate::types::{Bottleneck, BottleneckKind, ResourceSnapshot, Severity};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swarm_hooks::{HookContext, HookSystem};
use swarm_types::AgentId;
use tokio::sync::watch;
use tracing::info;

const TREND_WINDOW: usize = 5;
const QUEUE_BACKLOG_THRESHOLD: u64 = 50;
const SLOW_AGENT_SUCCESS_CEILING: f64 = 0.70;

/// Translates metrics + external resource telemetry into actionable
/// `Bottleneck` reports. The consensus-timeout rule is a
/// documented stub: it always returns `None` until a decision-latency feed
/// from the consensus engine is wired in.
pub struct BottleneckDetector {
    collector: Arc<MetricsCollector>,
    hooks: Arc<HookSystem>,
    token_trend: Mutex<VecDeque<f64>>,
    stop_tx: watch::Sender<bool>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BottleneckDetector {
    pub fn new(collector: Arc<MetricsCollector>, hooks: Arc<HookSystem>) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self { collector, hooks, token_trend: Mutex::new(VecDeque::new()), stop_tx, worker: Mutex::new(None) })
    }

    /// One detection pass over `resources` and the given agent set. At most
    /// one bottleneck per rule.
    pub fn detect(&self, resources: &ResourceSnapshot, agent_ids: &[AgentId]) -> Vec<Bottleneck> {
        let mut out = Vec::new();
        if let Some(b) = self.detect_token_exhaustion(resources) {
            out.push(b);
        }
        if let Some(b) = self.detect_quota_exceeded(resources) {
            out.push(b);
        }
        if let Some(b) = self.detect_slow_agent(agent_ids) {
            out.push(b);
        }
        if let Some(b) = self.detect_queue_backlog(resources) {
            out.push(b);
        }
        // detect_consensus_timeout intentionally omitted: stub always None.
        out
    }

    fn detect_token_exhaustion(&self, resources: &ResourceSnapshot) -> Option<Bottleneck> {
        if resources.token_budget <= 0.0 {
            return None;
        }
        let consumed_ratio = resources.tokens_consumed / resources.token_budget;
        if consumed_ratio <= 0.8 {
            return None;
        }
        let stats = self.collector.get_task_stats(None);
        let avg_tokens_per_task = if stats.count > 0 { stats.total_tokens as f64 / stats.count as f64 } else { 0.0 };
        let mut trend = self.token_trend.lock().unwrap_or_else(|p| p.into_inner());
        if trend.len() == TREND_WINDOW * 2 {
            trend.pop_front();
        }
        trend.push_back(avg_tokens_per_task);
        let samples: Vec<f64> = trend.iter().copied().collect();
        if classify_trend(&samples, TREND_WINDOW, false) != crate::reservoir::Trend::Degrading {
            return None;
        }
        let impact = (consumed_ratio + 0.2).min(1.0);
        Some(Bottleneck {
            kind: BottleneckKind::TokenExhaustion,
            severity: Severity::from_impact(impact),
            impact_score: impact,
            affected_ids: Vec::new(),
            evidence: HashMap::from([
                ("consumed_ratio".to_string(), json!(consumed_ratio)),
                ("avg_tokens_per_task".to_string(), json!(avg_tokens_per_task)),
            ]),
            recommendations: vec!["reduce per-task token budget or scale down concurrent tasks".to_string()],
        })
    }

    fn detect_quota_exceeded(&self, resources: &ResourceSnapshot) -> Option<Bottleneck> {
        if resources.agent_quota <= 0.0 {
            return None;
        }
        let active_ratio = resources.agents_active / resources.agent_quota;
        if active_ratio < 0.9 {
            return None;
        }
        let impact = (active_ratio + (resources.pending_tasks as f64 / 100.0)).min(1.0);
        Some(Bottleneck {
            kind: BottleneckKind::QuotaExceeded,
            severity: Severity::from_impact(impact),
            impact_score: impact,
            affected_ids: Vec::new(),
            evidence: HashMap::from([
                ("active_ratio".to_string(), json!(active_ratio)),
                ("pending_tasks".to_string(), json!(resources.pending_tasks)),
            ]),
            recommendations: vec!["raise the agent quota or shed queued low-priority tasks".to_string()],
        })
    }

    fn detect_slow_agent(&self, agent_ids: &[AgentId]) -> Option<Bottleneck> {
        if agent_ids.is_empty() {
            return None;
        }
        let overall = self.collector.get_task_stats(None);
        if overall.count == 0 {
            return None;
        }
        let swarm_avg = overall.avg_duration_ms;
        let mut worst: Option<(AgentId, f64, f64)> = None;
        for id in agent_ids {
            let perf = self.collector.get_agent_performance(id);
            if perf.task_count == 0 {
                continue;
            }
            if perf.avg_duration_ms > 2.0 * swarm_avg && perf.success_rate < SLOW_AGENT_SUCCESS_CEILING {
                let is_worse = worst.as_ref().map(|(_, d, _)| perf.avg_duration_ms > *d).unwrap_or(true);
                if is_worse {
                    worst = Some((id.clone(), perf.avg_duration_ms, perf.success_rate));
                }
            }
        }
        let (agent_id, avg_duration_ms, success_rate) = worst?;
        let affected_ratio = 1.0 / agent_ids.len() as f64;
        let perf_degradation_ratio = ((avg_duration_ms - 2.0 * swarm_avg) / (2.0 * swarm_avg)).clamp(0.0, 1.0);
        let failure_rate = 1.0 - success_rate;
        let impact = (affected_ratio + perf_degradation_ratio + failure_rate).min(1.0);
        Some(Bottleneck {
            kind: BottleneckKind::SlowAgent,
            severity: Severity::from_impact(impact),
            impact_score: impact,
            affected_ids: vec![agent_id],
            evidence: HashMap::from([
                ("avg_duration_ms".to_string(), json!(avg_duration_ms)),
                ("swarm_avg_duration_ms".to_string(), json!(swarm_avg)),
                ("success_rate".to_string(), json!(success_rate)),
            ]),
            recommendations: vec!["investigate or replace the underperforming agent".to_string()],
        })
    }

    fn detect_queue_backlog(&self, resources: &ResourceSnapshot) -> Option<Bottleneck> {
        if resources.pending_tasks <= QUEUE_BACKLOG_THRESHOLD {
            return None;
        }
        let high_priority_pending: u64 = resources.pending_by_priority.get("high").copied().unwrap_or(0)
            + resources.pending_by_priority.get("critical").copied().unwrap_or(0);
        let weighted = high_priority_pending as f64 / resources.pending_tasks.max(1) as f64;
        let impact = ((resources.pending_tasks as f64 / 100.0) + weighted).min(1.0);
        Some(Bottleneck {
            kind: BottleneckKind::QueueBacklog,
            severity: Severity::from_impact(impact),
            impact_score: impact,
            affected_ids: Vec::new(),
            evidence: HashMap::from([
                ("pending_tasks".to_string(), json!(resources.pending_tasks)),
                ("high_priority_pending".to_string(), json!(high_priority_pending)),
            ]),
            recommendations: vec!["add worker capacity or reprioritize the queue".to_string()],
        })
    }

    /// Spawns a worker that runs `detect` every `interval_ms` and fires
    /// `bottleneck_detected` for each report. Callers supply a closure to
    /// fetch the current resource snapshot and agent set each cycle, since
    /// the detector itself has no view of the coordinator's registry.
    pub fn monitor_continuously(
        self: Arc<Self>,
        interval_ms: u64,
        snapshot: impl Fn() -> (ResourceSnapshot, Vec<AgentId>) + Send + Sync + 'static,
    ) {
        let detector = self;
        let task_detector = detector.clone();
        let mut stop_rx = detector.stop_tx.subscribe();
        let handle = tokio::spawn(async move {
            let detector = task_detector;
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let (resources, agents) = snapshot();
                        for bottleneck in detector.detect(&resources, &agents) {
                            let hooks = detector.hooks.clone();
                            let payload = json!({
                                "kind": bottleneck.kind,
                                "severity": bottleneck.severity,
                                "impact_score": bottleneck.impact_score,
                                "affected_ids": bottleneck.affected_ids,
                            });
                            tokio::spawn(async move {
                                let ctx = HookContext::new("bottleneck_detected", payload);
                                let _ = hooks.fire("bottleneck_detected", ctx).await;
                            });
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            info!("bottleneck monitor stopping");
                            break;
                        }
                    }
                }
            }
        });
        *detector.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    pub fn stop_monitoring(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskMetric, TaskResult};
    use std::collections::HashMap as Map;

    fn detector() -> Arc<BottleneckDetector> {
        let collector = Arc::new(MetricsCollector::new_sync(None));
        let hooks = Arc::new(HookSystem::new(swarm_hooks::HooksConfig::default()));
        BottleneckDetector::new(collector, hooks)
    }

    #[test]
    fn quota_exceeded_escalates_with_pending_tasks() {
        let d = detector();
        let resources = ResourceSnapshot { agent_quota: 10.0, agents_active: 10.0, pending_tasks: 40, ..Default::default() };
        let bottleneck = d.detect_quota_exceeded(&resources).unwrap();
        assert_eq!(bottleneck.kind, BottleneckKind::QuotaExceeded);
        assert!(bottleneck.impact_score > 0.9);
    }

    #[test]
    fn no_quota_bottleneck_below_threshold() {
        let d = detector();
        let resources = ResourceSnapshot { agent_quota: 10.0, agents_active: 5.0, ..Default::default() };
        assert!(d.detect_quota_exceeded(&resources).is_none());
    }

    #[test]
    fn queue_backlog_detected_past_threshold() {
        let d = detector();
        let resources = ResourceSnapshot { pending_tasks: 80, ..Default::default() };
        let bottleneck = d.detect_queue_backlog(&resources).unwrap();
        assert_eq!(bottleneck.kind, BottleneckKind::QueueBacklog);
    }

    #[test]
    fn slow_agent_flagged_against_swarm_average() {
        let collector = Arc::new(MetricsCollector::new_sync(None));
        for i in 0..5 {
            collector.record_task_metric(TaskMetric {
                task_id: format!("t{i}"),
                agent_id: "fast".to_string(),
                duration_ms: 100,
                result: TaskResult::Success,
                tokens_used: None,
                files_changed: None,
                tags: Map::new(),
                recorded_at_ms: 0,
            });
        }
        for i in 0..5 {
            collector.record_task_metric(TaskMetric {
                task_id: format!("s{i}"),
                agent_id: "slow".to_string(),
                duration_ms: 1000,
                result: TaskResult::Failure,
                tokens_used: None,
                files_changed: None,
                tags: Map::new(),
                recorded_at_ms: 0,
            });
        }
        let hooks = Arc::new(HookSystem::new(swarm_hooks::HooksConfig::default()));
        let d = BottleneckDetector::new(collector, hooks);
        let agents = vec!["fast".to_string(), "slow".to_string()];
        let bottleneck = d.detect_slow_agent(&agents).unwrap();
        assert_eq!(bottleneck.affected_ids, vec!["slow".to_string()]);
    }
}
