use crate::context::HookContext;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type Predicate = Arc<dyn Fn(&HookContext) -> bool + Send + Sync>;
pub type SyncFn = Arc<dyn Fn(&mut HookContext) -> Result<(), String> + Send + Sync>;
pub type AsyncFn = Arc<dyn Fn(HookContext) -> BoxFuture<Result<(), String>> + Send + Sync>;

/// Priority band; lower numeric value runs first within a dependency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Deferred = 4,
}

/// How a hook's callable is invoked. `Custom` is a pluggable extension point
/// that currently shares the async scheduling path (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Sync,
    Async,
    Custom,
}

/// The callable a hook wraps. The `ExecutorKind` on `Hook` records the
/// declared intent; this enum is what `HookSystem` actually invokes.
#[derive(Clone)]
pub enum HookCallable {
    Sync(SyncFn),
    Async(AsyncFn),
}

/// Outcome of invoking one hook for one event.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HookResult {
    pub hook: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A registered lifecycle callback.
#[derive(Clone)]
pub struct Hook {
    pub name: String,
    pub event_type: String,
    pub callable: HookCallable,
    pub priority: Priority,
    pub predicates: Vec<Predicate>,
    pub dependencies: Vec<String>,
    pub executor: ExecutorKind,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u8>,
}

impl Hook {
    pub fn sync(name: impl Into<String>, event_type: impl Into<String>, f: SyncFn) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            callable: HookCallable::Sync(f),
            priority: Priority::Normal,
            predicates: Vec::new(),
            dependencies: Vec::new(),
            executor: ExecutorKind::Sync,
            timeout_ms: None,
            max_retries: None,
        }
    }

    pub fn async_hook(name: impl Into<String>, event_type: impl Into<String>, f: AsyncFn) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            callable: HookCallable::Async(f),
            priority: Priority::Normal,
            predicates: Vec::new(),
            dependencies: Vec::new(),
            executor: ExecutorKind::Async,
            timeout_ms: None,
            max_retries: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = Some(retries.min(3));
        self
    }

    pub fn passes_predicates(&self, ctx: &HookContext) -> bool {
        self.predicates.iter().all(|p| p(ctx))
    }
}
