mod bottleneck;
mod collector;
mod pattern;
mod reservoir;
mod types;

pub use bottleneck::BottleneckDetector;
pub use collector::{MetricEvent, MetricsCollector};
pub use pattern::PatternMatcher;
pub use reservoir::{classify_trend, Reservoir, Trend};
pub use types::{
    AgentMetric, AgentPerformance, Bottleneck, BottleneckKind, Pattern, PatternMatch, Prediction,
    ProcessEventResult, ResourceSnapshot, Severity, SwarmMetric, TaskMetric, TaskResult, TaskStats,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn severity_thresholds_match_impact_bands() {
        assert_eq!(Severity::from_impact(0.9), Severity::Critical);
        assert_eq!(Severity::from_impact(0.65), Severity::High);
        assert_eq!(Severity::from_impact(0.45), Severity::Medium);
        assert_eq!(Severity::from_impact(0.1), Severity::Low);
    }

    #[test]
    fn collector_and_bottleneck_detector_compose() {
        let collector = std::sync::Arc::new(MetricsCollector::new_sync(None));
        for i in 0..5 {
            collector.record_task_metric(TaskMetric {
                task_id: format!("t{i}"),
                agent_id: "a1".to_string(),
                duration_ms: 50,
                result: TaskResult::Success,
                tokens_used: Some(10),
                files_changed: None,
                tags: HashMap::new(),
                recorded_at_ms: 0,
            });
        }
        let hooks = std::sync::Arc::new(swarm_hooks::HookSystem::new(swarm_hooks::HooksConfig::default()));
        let detector = BottleneckDetector::new(collector, hooks);
        let resources = ResourceSnapshot { pending_tasks: 80, ..Default::default() };
        let findings = detector.detect(&resources, &["a1".to_string()]);
        assert!(findings.iter().any(|b| b.kind == BottleneckKind::QueueBacklog));
    }
}
