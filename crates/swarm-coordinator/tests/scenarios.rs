use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use swarm_coordinator::{Decision, HealthState, SwarmConfig, SwarmCoordinator};
use swarm_hooks::{Hook, HookCallable, HookContext, Priority};
use swarm_metrics::{BottleneckDetector, BottleneckKind, MetricsCollector, ResourceSnapshot, TaskMetric, TaskResult};

fn coordinator_with_topology(kind: &str) -> Arc<SwarmCoordinator> {
    SwarmCoordinator::new(SwarmConfig { topology_kind: kind.to_string(), metrics_async: false, ..Default::default() }).unwrap()
}

#[tokio::test]
async fn scenario_a_mesh_broadcast_and_health() {
    let c = coordinator_with_topology("mesh");
    for id in ["a1", "a2", "a3", "a4", "a5"] {
        c.register_agent(id, "worker", HashMap::new()).await.unwrap();
    }
    let reached = c.broadcast_message(&"a1".to_string(), serde_json::json!({"ping": 1}), None).await.unwrap();
    assert_eq!(reached, 4);
    assert_eq!(c.get_topology_info().connection_count, 10);
}

#[tokio::test]
async fn scenario_b_hierarchical_reparent_on_removal() {
    let c = coordinator_with_topology("hierarchical");
    c.register_agent("r", "worker", HashMap::new()).await.unwrap();
    c.register_agent_with_parent("c1", "worker", HashMap::new(), Some("r".to_string())).await.unwrap();
    c.register_agent_with_parent("c2", "worker", HashMap::new(), Some("r".to_string())).await.unwrap();
    c.register_agent_with_parent("g1", "worker", HashMap::new(), Some("c1".to_string())).await.unwrap();
    c.register_agent_with_parent("g2", "worker", HashMap::new(), Some("c1".to_string())).await.unwrap();

    c.unregister_agent(&"c1".to_string()).await.unwrap();

    let g1 = c.get_agent_status(&"g1".to_string()).unwrap();
    let g2 = c.get_agent_status(&"g2".to_string()).unwrap();
    assert_eq!(g1.parent_id.as_deref(), Some("r"));
    assert_eq!(g2.parent_id.as_deref(), Some("r"));
    assert_eq!(g1.hierarchy_layer, Some(1));
    assert_eq!(g2.hierarchy_layer, Some(1));
    assert_eq!(c.get_topology_info().agent_count, 4);
}

#[tokio::test]
async fn scenario_c_raft_election_and_proposal() {
    let c = coordinator_with_topology("mesh");
    for id in ["a1", "a2", "a3", "a4", "a5"] {
        c.register_agent(id, "worker", HashMap::new()).await.unwrap();
    }
    let result = c.request_consensus(serde_json::json!({"proposal_id": "p1"}), 3000).await;
    assert_eq!(result.decision, Decision::Approved);
    assert!(result.votes_for >= 3);
    assert_eq!(result.participants, 5);

    let state = c.consensus().get_state();
    assert_eq!(state.node_state, swarm_coordinator::NodeState::Leader);
    assert_eq!(state.log_len, 1);
}

#[tokio::test]
async fn scenario_d_heartbeat_state_transitions() {
    let c = coordinator_with_topology("mesh");
    c.register_agent("agent-001", "worker", HashMap::new()).await.unwrap();
    let monitor = c.heartbeat();

    monitor.stop_monitoring(&"agent-001".to_string());
    monitor.start_monitoring("agent-001".to_string(), Some(100), Some(3.0));
    monitor.record_heartbeat(&"agent-001".to_string(), None);

    assert_eq!(monitor.check_agent_health(&"agent-001".to_string()), Some(HealthState::Healthy));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(monitor.check_agent_health(&"agent-001".to_string()), Some(HealthState::Degraded));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.check_agent_health(&"agent-001".to_string()), Some(HealthState::Critical));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.check_agent_health(&"agent-001".to_string()), Some(HealthState::Failed));
}

#[tokio::test]
async fn scenario_e_hook_dependency_order_with_mixed_executors() {
    let c = coordinator_with_topology("mesh");
    let log: Arc<Mutex<Vec<(String, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

    let validate_log = log.clone();
    let validate = Hook {
        name: "validate".to_string(),
        event_type: "task_start".to_string(),
        callable: HookCallable::Sync(Arc::new(move |_ctx: &mut HookContext| {
            std::thread::sleep(Duration::from_millis(10));
            validate_log.lock().unwrap().push(("validate_end".to_string(), Instant::now()));
            Ok(())
        })),
        priority: Priority::Critical,
        predicates: Vec::new(),
        dependencies: Vec::new(),
        executor: swarm_hooks::ExecutorKind::Sync,
        timeout_ms: None,
        max_retries: None,
    };

    let persist_log = log.clone();
    let persist = Hook::async_hook(
        "persist",
        "task_start",
        Arc::new(move |_ctx: HookContext| {
            let persist_log = persist_log.clone();
            Box::pin(async move {
                persist_log.lock().unwrap().push(("persist_start".to_string(), Instant::now()));
                Ok(())
            })
        }),
    )
    .with_priority(Priority::Normal)
    .with_dependencies(vec!["validate".to_string()]);

    c.hooks().register_hook(validate).unwrap();
    c.hooks().register_hook(persist).unwrap();

    let ctx = HookContext::new("task_start", serde_json::json!({}));
    let results = c.hooks().fire("task_start", ctx).await.unwrap();
    assert!(results.iter().all(|r| r.success));

    let recorded = log.lock().unwrap();
    let validate_end = recorded.iter().find(|(name, _)| name == "validate_end").unwrap().1;
    let persist_start = recorded.iter().find(|(name, _)| name == "persist_start").unwrap().1;
    assert!(persist_start >= validate_end);
}

#[tokio::test]
async fn scenario_f_bottleneck_detection_triggers() {
    let collector = Arc::new(MetricsCollector::new_sync(None));
    for i in 0..100 {
        collector.record_task_metric(TaskMetric {
            task_id: format!("fast-{i}"),
            agent_id: "fast".to_string(),
            duration_ms: 200,
            result: TaskResult::Success,
            tokens_used: Some(10),
            files_changed: None,
            tags: HashMap::new(),
            recorded_at_ms: 0,
        });
    }
    for i in 0..50 {
        collector.record_task_metric(TaskMetric {
            task_id: format!("slow-{i}"),
            agent_id: "slow".to_string(),
            duration_ms: 1000,
            result: TaskResult::Failure,
            tokens_used: Some(10),
            files_changed: None,
            tags: HashMap::new(),
            recorded_at_ms: 0,
        });
    }
    let hooks = Arc::new(swarm_hooks::HookSystem::new(swarm_hooks::HooksConfig::default()));
    let detector = BottleneckDetector::new(collector.clone(), hooks);

    let resources = ResourceSnapshot {
        token_budget: 1000.0,
        tokens_consumed: 900.0,
        agent_quota: 10.0,
        agents_active: 9.0,
        pending_tasks: 60,
        pending_by_priority: HashMap::new(),
    };
    let agents = vec!["fast".to_string(), "slow".to_string()];

    // Builds a degrading avg-tokens-per-task trend across detection cycles:
    // five quiet cycles followed by five token-heavy ones, so the "last 5 vs
    // prior 5" moving-average comparison crosses the degrading threshold.
    for i in 0..10 {
        let tokens = if i < 5 { 10 } else { 1000 };
        collector.record_task_metric(TaskMetric {
            task_id: format!("trend-{i}"),
            agent_id: "fast".to_string(),
            duration_ms: 200,
            result: TaskResult::Success,
            tokens_used: Some(tokens),
            files_changed: None,
            tags: HashMap::new(),
            recorded_at_ms: 0,
        });
        detector.detect(&resources, &agents);
    }

    let started = Instant::now();
    let bottlenecks = detector.detect(&resources, &agents);
    assert!(started.elapsed() < Duration::from_millis(100));

    assert!(bottlenecks.iter().any(|b| b.kind == BottleneckKind::TokenExhaustion));
    assert!(bottlenecks.iter().any(|b| b.kind == BottleneckKind::QuotaExceeded));
    assert!(bottlenecks.iter().any(|b| b.kind == BottleneckKind::QueueBacklog));
    let slow = bottlenecks.iter().find(|b| b.kind == BottleneckKind::SlowAgent).unwrap();
    assert_eq!(slow.affected_ids, vec!["slow".to_string()]);
}
