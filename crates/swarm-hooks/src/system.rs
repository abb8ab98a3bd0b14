use crate::context::HookContext;
use crate::dispatch::topological_order;
use crate::error::HookError;
use crate::hook::{Hook, HookCallable, HookResult};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Tunables for the hook dispatch configuration surface.
#[derive(Debug, Clone)]
pub struct HooksConfig {
    pub default_sync_timeout_ms: u64,
    pub default_async_timeout_ms: u64,
    pub async_concurrency: usize,
    pub graceful_degradation: bool,
    pub max_retries: u8,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            default_sync_timeout_ms: 2000,
            default_async_timeout_ms: 5000,
            async_concurrency: 10,
            graceful_degradation: true,
            max_retries: 2,
        }
    }
}

struct Registered {
    hook: Hook,
    insertion_index: u64,
}

/// Dispatches lifecycle events to registered hooks in dependency + priority
/// order.
pub struct HookSystem {
    hooks: DashMap<String, Registered>,
    dispatch_cache: DashMap<String, Vec<String>>,
    next_index: AtomicU64,
    config: HooksConfig,
    async_gate: Arc<Semaphore>,
}

impl HookSystem {
    pub fn new(config: HooksConfig) -> Self {
        let async_gate = Arc::new(Semaphore::new(config.async_concurrency.max(1)));
        Self {
            hooks: DashMap::new(),
            dispatch_cache: DashMap::new(),
            next_index: AtomicU64::new(0),
            config,
            async_gate,
        }
    }

    pub fn config(&self) -> &HooksConfig {
        &self.config
    }

    /// Registers `hook`. Rejects duplicate names, unknown dependency names,
    /// and any dependency cycle the new hook would introduce.
    pub fn register_hook(&self, hook: Hook) -> Result<(), HookError> {
        if self.hooks.contains_key(&hook.name) {
            return Err(HookError::DuplicateHook(hook.name));
        }
        for dep in &hook.dependencies {
            if !self.hooks.contains_key(dep) {
                return Err(HookError::UnknownDependency { hook: hook.name.clone(), dependency: dep.clone() });
            }
        }

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let event_type = hook.event_type.clone();
        let name = hook.name.clone();
        self.hooks.insert(name.clone(), Registered { hook, insertion_index: index });

        // Validate the whole graph (not just this event's hooks) so a cycle
        // spanning event types is caught at registration time, not at fire().
        if let Err(e) = self.recompute_order_for_all_events() {
            self.hooks.remove(&name);
            return Err(e);
        }
        self.dispatch_cache.remove(&event_type);
        Ok(())
    }

    /// Removes a hook. Returns `false` (no error) if it was not registered,
    /// matching the coordinator's idempotence contract.
    pub fn unregister_hook(&self, name: &str) -> bool {
        if let Some((_, removed)) = self.hooks.remove(name) {
            self.dispatch_cache.remove(&removed.hook.event_type);
            true
        } else {
            false
        }
    }

    fn recompute_order_for_all_events(&self) -> Result<(), HookError> {
        let all: HashMap<String, Hook> = self.hooks.iter().map(|e| (e.key().clone(), e.value().hook.clone())).collect();
        let insertion: HashMap<String, u64> = self.hooks.iter().map(|e| (e.key().clone(), e.value().insertion_index)).collect();
        topological_order(&all, &insertion).map(|_| ())
    }

    fn order_for_event(&self, event_type: &str) -> Result<Vec<String>, HookError> {
        if let Some(cached) = self.dispatch_cache.get(event_type) {
            return Ok(cached.clone());
        }
        let relevant: HashMap<String, Hook> = self
            .hooks
            .iter()
            .filter(|e| e.value().hook.event_type == event_type)
            .map(|e| (e.key().clone(), e.value().hook.clone()))
            .collect();
        let insertion: HashMap<String, u64> = self
            .hooks
            .iter()
            .filter(|e| e.value().hook.event_type == event_type)
            .map(|e| (e.key().clone(), e.value().insertion_index))
            .collect();
        let order = topological_order(&relevant, &insertion)?;
        self.dispatch_cache.insert(event_type.to_string(), order.clone());
        Ok(order)
    }

    /// Dispatches `event_type` to every matching hook in dependency/priority
    /// order, sequentially awaiting each one (so dependents truly observe
    /// their dependencies' completion, whether sync or async). Returns one
    /// `HookResult` per hook whose predicates passed.
    pub async fn fire(&self, event_type: &str, ctx: HookContext) -> Result<Vec<HookResult>, HookError> {
        let order = self.order_for_event(event_type)?;
        let mut results = Vec::new();
        for name in order {
            let Some(entry) = self.hooks.get(&name) else { continue };
            let hook = entry.hook.clone();
            drop(entry);
            if !hook.passes_predicates(&ctx) {
                continue;
            }
            let result = self.run_with_retries(&hook, ctx.clone()).await;
            let failed = !result.success;
            results.push(result);
            if failed && !self.config.graceful_degradation {
                break;
            }
        }
        Ok(results)
    }

    /// Non-blocking variant: sync hooks still run inline (dependents must see
    /// their result), but hooks declared async are spawned on the bounded
    /// pool and their completion is only awaited by hooks that depend on
    /// them, not by the caller of `fire_async` itself.
    pub fn fire_async(&self, event_type: &str, ctx: HookContext) -> Result<FireHandle, HookError> {
        let order = self.order_for_event(event_type)?;
        let mut handles = Vec::new();
        let mut completion: HashMap<String, Arc<tokio::sync::Notify>> = HashMap::new();

        for name in order {
            let Some(entry) = self.hooks.get(&name) else { continue };
            let hook = entry.hook.clone();
            drop(entry);
            let notify = Arc::new(tokio::sync::Notify::new());
            completion.insert(name.clone(), notify.clone());

            if !hook.passes_predicates(&ctx) {
                notify.notify_waiters();
                continue;
            }

            match &hook.callable {
                HookCallable::Sync(_) => {
                    let result = futures_block_in_place(self, &hook, ctx.clone());
                    debug!(hook = %hook.name, success = result.success, "sync hook ran inline under fire_async");
                    notify.notify_waiters();
                }
                HookCallable::Async(_) => {
                    let deps: Vec<Arc<tokio::sync::Notify>> = hook
                        .dependencies
                        .iter()
                        .filter_map(|d| completion.get(d).cloned())
                        .collect();
                    let gate = self.async_gate.clone();
                    let hook_clone = hook.clone();
                    let ctx_clone = ctx.clone();
                    let notify_clone = notify.clone();
                    let timeout_ms = hook.timeout_ms.unwrap_or(self.config.default_async_timeout_ms);
                    let max_retries = hook.max_retries.unwrap_or(self.config.max_retries).min(3);
                    let handle = tokio::spawn(async move {
                        for dep in deps {
                            dep.notified().await;
                        }
                        let _permit = gate.acquire().await;
                        let result = run_async_with_retries(&hook_clone, ctx_clone, timeout_ms, max_retries).await;
                        notify_clone.notify_waiters();
                        result
                    });
                    handles.push(handle);
                }
            }
        }
        Ok(FireHandle { handles })
    }

    async fn run_with_retries(&self, hook: &Hook, ctx: HookContext) -> HookResult {
        match &hook.callable {
            HookCallable::Sync(_) => {
                let timeout_ms = hook.timeout_ms.unwrap_or(self.config.default_sync_timeout_ms);
                let max_retries = hook.max_retries.unwrap_or(self.config.max_retries).min(3);
                run_sync_with_retries(hook, ctx, timeout_ms, max_retries).await
            }
            HookCallable::Async(_) => {
                let timeout_ms = hook.timeout_ms.unwrap_or(self.config.default_async_timeout_ms);
                let max_retries = hook.max_retries.unwrap_or(self.config.max_retries).min(3);
                let _permit = self.async_gate.acquire().await;
                run_async_with_retries(hook, ctx, timeout_ms, max_retries).await
            }
        }
    }
}

/// Handle returned by `fire_async`; await it to observe every spawned async
/// hook's `HookResult`, or drop it to let them finish in the background.
pub struct FireHandle {
    handles: Vec<tokio::task::JoinHandle<HookResult>>,
}

impl FireHandle {
    pub async fn join_all(self) -> Vec<HookResult> {
        let mut out = Vec::with_capacity(self.handles.len());
        for h in self.handles {
            if let Ok(result) = h.await {
                out.push(result);
            }
        }
        out
    }
}

fn futures_block_in_place(system: &HookSystem, hook: &Hook, ctx: HookContext) -> HookResult {
    // `fire_async` is synchronous up to the point of spawning async hooks, so
    // a sync hook invoked from it runs with a direct call rather than a real
    // timeout; sync hooks are expected to be fast (see `hooks.default_sync_timeout_ms`).
    let _ = system;
    let start = Instant::now();
    if let HookCallable::Sync(f) = &hook.callable {
        let mut ctx = ctx;
        match f(&mut ctx) {
            Ok(()) => HookResult { hook: hook.name.clone(), success: true, error: None, duration_ms: start.elapsed().as_millis() as u64 },
            Err(e) => HookResult { hook: hook.name.clone(), success: false, error: Some(e), duration_ms: start.elapsed().as_millis() as u64 },
        }
    } else {
        HookResult { hook: hook.name.clone(), success: false, error: Some("not a sync hook".into()), duration_ms: 0 }
    }
}

async fn run_sync_with_retries(hook: &Hook, ctx: HookContext, timeout_ms: u64, max_retries: u8) -> HookResult {
    let HookCallable::Sync(f) = hook.callable.clone() else {
        return HookResult { hook: hook.name.clone(), success: false, error: Some("not a sync hook".into()), duration_ms: 0 };
    };
    let name = hook.name.clone();
    let mut last: Option<HookResult> = None;
    for attempt in 0..=max_retries {
        let f = f.clone();
        let name_for_task = name.clone();
        let start = Instant::now();
        let ctx_for_task = ctx.clone();
        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::task::spawn_blocking(move || {
                let mut ctx = ctx_for_task;
                f(&mut ctx)
            }),
        )
        .await;
        let result = match outcome {
            Ok(Ok(Ok(()))) => HookResult { hook: name_for_task, success: true, error: None, duration_ms: start.elapsed().as_millis() as u64 },
            Ok(Ok(Err(e))) => HookResult { hook: name_for_task, success: false, error: Some(e), duration_ms: start.elapsed().as_millis() as u64 },
            Ok(Err(join_err)) => HookResult { hook: name_for_task, success: false, error: Some(join_err.to_string()), duration_ms: start.elapsed().as_millis() as u64 },
            Err(_) => HookResult { hook: name_for_task, success: false, error: Some("timed out".into()), duration_ms: timeout_ms },
        };
        if result.success || attempt == max_retries {
            last = Some(result);
            break;
        }
        warn!(hook = %name, attempt, "hook failed, retrying");
        last = Some(result);
    }
    last.expect("loop always sets last before exiting")
}

async fn run_async_with_retries(hook: &Hook, ctx: HookContext, timeout_ms: u64, max_retries: u8) -> HookResult {
    let HookCallable::Async(f) = hook.callable.clone() else {
        return HookResult { hook: hook.name.clone(), success: false, error: Some("not an async hook".into()), duration_ms: 0 };
    };
    let name = hook.name.clone();
    let mut last: Option<HookResult> = None;
    for attempt in 0..=max_retries {
        let start = Instant::now();
        let fut = f(ctx.clone());
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await;
        let result = match outcome {
            Ok(Ok(())) => HookResult { hook: name.clone(), success: true, error: None, duration_ms: start.elapsed().as_millis() as u64 },
            Ok(Err(e)) => HookResult { hook: name.clone(), success: false, error: Some(e), duration_ms: start.elapsed().as_millis() as u64 },
            Err(_) => HookResult { hook: name.clone(), success: false, error: Some("timed out".into()), duration_ms: timeout_ms },
        };
        if result.success || attempt == max_retries {
            last = Some(result);
            break;
        }
        warn!(hook = %name, attempt, "async hook failed, retrying");
        last = Some(result);
    }
    last.expect("loop always sets last before exiting")
}
