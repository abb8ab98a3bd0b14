//! Single-process runtime that wires the agent registry, topology graph,
//! hook dispatcher, heartbeat monitor, metrics/bottleneck engine, and
//! consensus engine behind one facade.

mod config;
mod coordinator;
mod error;

pub use config::{ConsensusConfigDto, HeartbeatConfigDto, HooksConfigDto, SwarmConfig};
pub use coordinator::SwarmCoordinator;
pub use error::CoordinatorError;

pub use swarm_consensus::{ConsensusResult, Decision, NodeState};
pub use swarm_heartbeat::HealthState;
pub use swarm_metrics::{Bottleneck, BottleneckKind, Severity};
pub use swarm_topology::{TopologyKind, TopologyMetrics};
pub use swarm_types::{Agent, AgentId, AgentSnapshot, AgentState, Metadata};
