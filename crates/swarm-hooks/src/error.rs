/// Hook registration and dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook '{0}' is already registered")]
    DuplicateHook(String),

    #[error("hook '{hook}' depends on unknown hook '{dependency}'")]
    UnknownDependency { hook: String, dependency: String },

    #[error("dependency cycle detected involving hook '{0}'")]
    DependencyCycle(String),

    #[error("hook '{name}' failed: {reason}")]
    HookFailed { name: String, reason: String },
}
