//! Agent liveness tracking: bounded per-agent heartbeat history, on-demand
//! health classification, and a background sweeper that raises
//! `health_changed` hook events on state transitions.

mod health;
mod monitor;
mod record;

pub use health::HealthState;
pub use monitor::{AlertCallback, HeartbeatConfig, HeartbeatMonitor};
pub use record::{HeartbeatEntry, HeartbeatRecord};
