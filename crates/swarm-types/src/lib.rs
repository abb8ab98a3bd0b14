//! Shared data model used by every swarm-core crate: agents, messages, and
//! the coordinator-wide synchronized state map.
//!
//! Kept dependency-free (no tokio, no dashmap) so it can sit at the bottom of
//! the dependency graph without pulling an async runtime into crates that
//! only need the data shapes.

mod agent;
mod message;
mod state;

pub use agent::{Agent, AgentId, AgentSnapshot, AgentState, TopologyExtras};
pub use message::{Message, MessageTarget};
pub use state::SyncStateEntry;

/// Metadata map used at every boundary: string keys, opaque JSON values.
/// Callers may stash structured data without the core needing to know its
/// shape.
pub type Metadata = std::collections::HashMap<String, serde_json::Value>;
