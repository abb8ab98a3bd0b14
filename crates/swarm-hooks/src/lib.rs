//! Prioritized, dependency-ordered lifecycle hook dispatcher used by the
//! coordinator to run validation, persistence, and notification callbacks
//! around agent and swarm events.

mod context;
mod dispatch;
mod error;
mod hook;
mod system;

pub use context::HookContext;
pub use error::HookError;
pub use hook::{BoxFuture, ExecutorKind, Hook, HookCallable, HookResult, Priority};
pub use system::{FireHandle, HookSystem, HooksConfig};
