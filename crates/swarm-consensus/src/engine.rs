use crate::error::ConsensusError;
use crate::types::{ConsensusConfig, ConsensusResult, ConsensusState, Decision, LogEntry, NodeState};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swarm_hooks::{HookContext, HookSystem};
use swarm_types::AgentId;
use tokio::sync::watch;
use tracing::{error, info};

fn majority(total: usize) -> usize {
    total / 2 + 1
}

/// Raft-style leader election and log replication over the swarm's current
/// agent set. There is no real network: "voting" and "log
/// replication" are simulated against the live registry state the caller
/// supplies each round, since every agent lives in this one process.
pub struct ConsensusEngine {
    self_id: AgentId,
    config: ConsensusConfig,
    node_state: Mutex<NodeState>,
    current_term: AtomicU64,
    voted_for: Mutex<Option<AgentId>>,
    leader_id: Mutex<Option<AgentId>>,
    log: Mutex<Vec<LogEntry>>,
    commit_index: AtomicU64,
    hooks: Arc<HookSystem>,
    stop_tx: watch::Sender<bool>,
    ticker: Mutex<Option<tokio::task::JoinHandle<()>>>,
    tick_error_count: AtomicU64,
}

impl ConsensusEngine {
    pub fn new(self_id: impl Into<AgentId>, config: ConsensusConfig, hooks: Arc<HookSystem>) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        let engine = Arc::new(Self {
            self_id: self_id.into(),
            config,
            node_state: Mutex::new(NodeState::Follower),
            current_term: AtomicU64::new(0),
            voted_for: Mutex::new(None),
            leader_id: Mutex::new(None),
            log: Mutex::new(Vec::new()),
            commit_index: AtomicU64::new(0),
            hooks,
            stop_tx,
            ticker: Mutex::new(None),
            tick_error_count: AtomicU64::new(0),
        });
        Arc::clone(&engine).spawn_ticker();
        engine
    }

    fn spawn_ticker(self: Arc<Self>) {
        let engine = self;
        let mut stop_rx = engine.stop_tx.subscribe();
        let interval_ms = engine.config.heartbeat_interval_ms;
        let engine_for_task = engine.clone();
        let handle = tokio::spawn(async move {
            let engine = engine_for_task;
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if *engine.node_state.lock().unwrap_or_else(|p| p.into_inner()) == NodeState::Leader {
                            // heartbeat tick: nothing to send in a single-process
                            // simulation, but this is where AppendEntries heartbeats
                            // would be dispatched to followers.
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            info!(agent = %engine.self_id, "consensus ticker stopping");
                            break;
                        }
                    }
                }
            }
        });
        *engine.ticker.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    pub fn tick_error_count(&self) -> u64 {
        self.tick_error_count.load(Ordering::Relaxed)
    }

    /// Runs one election round against `active_ids` (agents not `FAILED`)
    /// out of `total_agents` registered. Blocks until a leader emerges or
    /// `ElectionTimeout` after `2 * election_timeout_base_ms`.
    pub async fn elect_leader(&self, active_ids: &[AgentId], total_agents: usize) -> Result<AgentId, ConsensusError> {
        let needed = majority(total_agents.max(1));
        if active_ids.len() < needed {
            return Err(ConsensusError::InsufficientQuorum { active: active_ids.len(), total: total_agents });
        }

        let base = self.config.election_timeout_base_ms;
        let jitter_ms = rand::thread_rng().gen_range(base..=2 * base);

        *self.node_state.lock().unwrap_or_else(|p| p.into_inner()) = NodeState::Candidate;
        let term = self.current_term.fetch_add(1, Ordering::SeqCst) + 1;
        *self.voted_for.lock().unwrap_or_else(|p| p.into_inner()) = Some(self.self_id.clone());

        let outcome = tokio::time::timeout(Duration::from_millis(jitter_ms), async {
            // Deterministic election: the lexicographically smallest active
            // agent ID wins ties at the same term.
            let mut candidates = active_ids.to_vec();
            candidates.sort();
            candidates.into_iter().next()
        })
        .await;

        match outcome {
            Ok(Some(winner)) => {
                // There is exactly one engine instance for the whole swarm
                // (no separate peer processes to hand leadership to), so this
                // engine assumes the leader role on behalf of whichever agent
                // the election selected; `leader_id` records who that is.
                *self.node_state.lock().unwrap_or_else(|p| p.into_inner()) = NodeState::Leader;
                *self.leader_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(winner.clone());
                info!(term, leader = %winner, "election completed");
                Ok(winner)
            }
            _ => {
                *self.node_state.lock().unwrap_or_else(|p| p.into_inner()) = NodeState::Follower;
                Err(ConsensusError::ElectionTimeout(2 * base))
            }
        }
    }

    /// Appends `payload` to the log, then waits for a majority of
    /// `active_ids` (out of `total_agents`) to "acknowledge" replication,
    /// bounded by `timeout_ms`. There is no real network to replicate over,
    /// so the replication round is simulated as one heartbeat-interval wait
    /// standing in for the AppendEntries round trip; if `timeout_ms` elapses
    /// first the entry stays in the log uncommitted and this returns
    /// `Decision::Timeout`, matching a leader that keeps retrying a slow
    /// round rather than losing the entry.
    pub async fn propose(&self, payload: serde_json::Value, active_ids: &[AgentId], total_agents: usize, timeout_ms: u64) -> ConsensusResult {
        let threshold = majority(total_agents.max(1));
        if *self.node_state.lock().unwrap_or_else(|p| p.into_inner()) != NodeState::Leader {
            return ConsensusResult {
                decision: Decision::Rejected,
                votes_for: 0,
                votes_against: 0,
                abstain: 0,
                threshold,
                participants: active_ids.len(),
                metadata: HashMap::from([("reason".to_string(), serde_json::json!("not_leader"))]),
            };
        }
        if active_ids.len() < threshold {
            return ConsensusResult {
                decision: Decision::Timeout,
                votes_for: 0,
                votes_against: 0,
                abstain: active_ids.len(),
                threshold,
                participants: active_ids.len(),
                metadata: HashMap::from([("reason".to_string(), serde_json::json!("insufficient_quorum"))]),
            };
        }

        let term = self.current_term.load(Ordering::SeqCst);
        let index = {
            let mut log = self.log.lock().unwrap_or_else(|p| p.into_inner());
            let index = log.len() as u64 + 1;
            log.push(LogEntry { index, term, payload, committed: false });
            index
        };
        let votes_for = active_ids.len();

        let replication = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::time::sleep(Duration::from_millis(self.config.heartbeat_interval_ms)),
        )
        .await;

        match replication {
            Ok(()) => {
                let mut log = self.log.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(entry) = log.iter_mut().find(|e| e.index == index) {
                    entry.committed = true;
                }
                drop(log);
                self.commit_index.store(index, Ordering::SeqCst);

                ConsensusResult {
                    decision: Decision::Approved,
                    votes_for,
                    votes_against: 0,
                    abstain: 0,
                    threshold,
                    participants: active_ids.len(),
                    metadata: HashMap::from([("committed_index".to_string(), serde_json::json!(index))]),
                }
            }
            Err(_) => ConsensusResult {
                decision: Decision::Timeout,
                votes_for: 0,
                votes_against: 0,
                abstain: active_ids.len(),
                threshold,
                participants: active_ids.len(),
                metadata: HashMap::from([
                    ("reason".to_string(), serde_json::json!("replication_timeout")),
                    ("log_index".to_string(), serde_json::json!(index)),
                ]),
            },
        }
    }

    pub fn get_state(&self) -> ConsensusState {
        ConsensusState {
            node_state: *self.node_state.lock().unwrap_or_else(|p| p.into_inner()),
            current_term: self.current_term.load(Ordering::SeqCst),
            leader_id: self.leader_id.lock().unwrap_or_else(|p| p.into_inner()).clone(),
            commit_index: self.commit_index.load(Ordering::SeqCst),
            log_len: self.log.lock().unwrap_or_else(|p| p.into_inner()).len(),
        }
    }

    pub fn reset(&self) {
        *self.node_state.lock().unwrap_or_else(|p| p.into_inner()) = NodeState::Follower;
        self.current_term.store(0, Ordering::SeqCst);
        *self.voted_for.lock().unwrap_or_else(|p| p.into_inner()) = None;
        *self.leader_id.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.log.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.commit_index.store(0, Ordering::SeqCst);
    }

    pub fn fire_leader_changed(&self, leader: &AgentId) {
        let hooks = self.hooks.clone();
        let leader = leader.clone();
        tokio::spawn(async move {
            let ctx = HookContext::new("leader_changed", serde_json::json!({ "leader_id": leader }));
            if let Err(e) = hooks.fire("leader_changed", ctx).await {
                error!(error = %e, "failed to fire leader_changed hook");
            }
        });
    }

    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.ticker.lock().unwrap_or_else(|p| p.into_inner()).take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(self_id: &str) -> Arc<ConsensusEngine> {
        let hooks = Arc::new(HookSystem::new(swarm_hooks::HooksConfig::default()));
        ConsensusEngine::new(self_id, ConsensusConfig { election_timeout_base_ms: 50, heartbeat_interval_ms: 20 }, hooks)
    }

    #[tokio::test]
    async fn election_picks_lexicographically_smallest_active_id() {
        let e = engine("b");
        let active = vec!["b".to_string(), "a".to_string(), "c".to_string()];
        let leader = e.elect_leader(&active, 3).await.unwrap();
        assert_eq!(leader, "a");
        // One engine serves the whole swarm, so it assumes the leader role
        // on behalf of whichever agent won; `leader_id` names the winner.
        assert_eq!(e.get_state().node_state, NodeState::Leader);
        assert_eq!(e.get_state().leader_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn election_fails_below_quorum() {
        let e = engine("a");
        let active = vec!["a".to_string()];
        let err = e.elect_leader(&active, 5).await.unwrap_err();
        assert!(matches!(err, ConsensusError::InsufficientQuorum { .. }));
    }

    #[tokio::test]
    async fn propose_rejected_when_not_leader() {
        let e = engine("a");
        let active = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = e.propose(serde_json::json!({"x": 1}), &active, 3, 1000).await;
        assert_eq!(result.decision, Decision::Rejected);
    }

    #[tokio::test]
    async fn propose_commits_once_elected_leader() {
        let e = engine("a");
        let active = vec!["a".to_string()];
        let leader = e.elect_leader(&active, 1).await.unwrap();
        assert_eq!(leader, "a");
        let result = e.propose(serde_json::json!({"x": 1}), &active, 1, 1000).await;
        assert_eq!(result.decision, Decision::Approved);
        assert_eq!(e.get_state().commit_index, 1);
    }

    #[tokio::test]
    async fn propose_times_out_on_insufficient_quorum() {
        let e = engine("a");
        let all = vec!["a".to_string()];
        let _ = e.elect_leader(&all, 1).await.unwrap();
        let result = e.propose(serde_json::json!({}), &[], 5, 1000).await;
        assert_eq!(result.decision, Decision::Timeout);
    }

    #[tokio::test]
    async fn propose_times_out_when_replication_outlasts_timeout_ms() {
        // heartbeat_interval_ms is 20 for this test engine, so a 1ms budget
        // for the simulated replication round must elapse first.
        let e = engine("a");
        let active = vec!["a".to_string()];
        let _ = e.elect_leader(&active, 1).await.unwrap();
        let result = e.propose(serde_json::json!({"x": 1}), &active, 1, 1).await;
        assert_eq!(result.decision, Decision::Timeout);
        assert_eq!(result.metadata.get("reason").and_then(|v| v.as_str()), Some("replication_timeout"));
        // the entry stays in the log, uncommitted, for a retried round.
        assert_eq!(e.get_state().log_len, 1);
        assert_eq!(e.get_state().commit_index, 0);
    }

    #[tokio::test]
    async fn reset_clears_term_and_log() {
        let e = engine("a");
        e.current_term.store(7, Ordering::SeqCst);
        e.reset();
        assert_eq!(e.get_state().current_term, 0);
        assert_eq!(e.get_state().log_len, 0);
    }
}
