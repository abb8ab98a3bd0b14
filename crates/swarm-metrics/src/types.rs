use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use swarm_types::AgentId;

/// Outcome of a completed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskResult {
    Success,
    Failure,
    Timeout,
    Canceled,
}

impl TaskResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskResult::Success => "SUCCESS",
            TaskResult::Failure => "FAILURE",
            TaskResult::Timeout => "TIMEOUT",
            TaskResult::Canceled => "CANCELED",
        }
    }
}

/// Immutable record of one completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetric {
    pub task_id: String,
    pub agent_id: AgentId,
    pub duration_ms: u64,
    pub result: TaskResult,
    pub tokens_used: Option<u64>,
    pub files_changed: Option<u32>,
    pub tags: HashMap<String, String>,
    pub recorded_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetric {
    pub agent_id: AgentId,
    pub metric_type: String,
    pub value: f64,
    pub recorded_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmMetric {
    pub swarm_id: String,
    pub metric_type: String,
    pub value: f64,
    pub recorded_at_ms: u64,
}

/// Summary statistics returned by `get_task_stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub count: usize,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub total_tokens: u64,
}

/// Summary statistics returned by `get_agent_performance`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentPerformance {
    pub avg_duration_ms: f64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub task_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BottleneckKind {
    TokenExhaustion,
    QuotaExceeded,
    SlowAgent,
    QueueBacklog,
    ConsensusTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_impact(impact: f64) -> Self {
        if impact >= 0.8 {
            Severity::Critical
        } else if impact >= 0.6 {
            Severity::High
        } else if impact >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub severity: Severity,
    pub impact_score: f64,
    pub affected_ids: Vec<String>,
    pub evidence: HashMap<String, serde_json::Value>,
    pub recommendations: Vec<String>,
}

/// External resource telemetry the Bottleneck Detector reads each cycle.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub token_budget: f64,
    pub tokens_consumed: f64,
    pub agent_quota: f64,
    pub agents_active: f64,
    pub pending_tasks: u64,
    pub pending_by_priority: HashMap<String, u64>,
}

/// A learned sequence of event types, matched against live activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub sequence: Vec<String>,
    pub occurrence_count: u64,
    pub confidence: f64,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Typical interval between consecutive events in the sequence, used by
    /// the temporal-similarity score.
    pub typical_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternMatch {
    pub pattern_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub event_type: String,
    pub probability: f64,
    pub source_pattern_id: String,
}

/// Return value of `PatternMatcher::process_event`: the patterns that
/// cleared the match threshold plus the ranked predictions derived from them.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessEventResult {
    pub matches: Vec<PatternMatch>,
    pub predictions: Vec<Prediction>,
}
