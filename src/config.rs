use crate::error::ScopeError;
use std::fmt;
use std::rc::Rc;

/// Default iteration budget of a digest.
///
/// A digest that has not reached a clean pass after this many passes fails
/// with [`ScopeError::Diverged`].
pub const DEFAULT_TTL: usize = 10;

/// What happens when a watch function, listener or queued task panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// The panic unwinds out of `digest`/`apply`. The phase is still reset
    /// and watcher bookkeeping stays consistent.
    #[default]
    Propagate,
    /// The panic is caught, handed to the error handler, and the digest
    /// continues with the next watcher or task.
    Isolate,
}

type ErrorHandler = Rc<dyn Fn(&ScopeError)>;

/// Builder-style configuration for a [`Scope`](crate::Scope).
///
/// # Example
///
/// ```ignore
/// let config = ScopeConfig::new()
///     .with_ttl(20)
///     .with_failure_policy(FailurePolicy::Isolate)
///     .with_error_handler(|err| eprintln!("scope error: {err}"));
/// let scope = Scope::with_config(model, config);
/// ```
#[derive(Clone)]
pub struct ScopeConfig {
    ttl: usize,
    failure_policy: FailurePolicy,
    error_handler: Option<ErrorHandler>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeConfig {
    /// Defaults:
    /// - `ttl`: 10
    /// - `failure_policy`: [`FailurePolicy::Propagate`]
    /// - `error_handler`: log through `tracing::error!`
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            failure_policy: FailurePolicy::Propagate,
            error_handler: None,
        }
    }

    /// Set the maximum number of passes a digest may run. Clamped to at least 1.
    pub fn with_ttl(mut self, ttl: usize) -> Self {
        self.ttl = ttl.max(1);
        self
    }

    /// Set how callback panics are handled.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Receive errors that have no caller to return to: digests started by
    /// the scheduler, deferred flushes, and panics isolated under
    /// [`FailurePolicy::Isolate`].
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ScopeError) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Maximum number of passes a digest may run.
    pub fn ttl(&self) -> usize {
        self.ttl
    }

    /// How callback panics are handled.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub(crate) fn report(&self, err: &ScopeError) {
        match &self.error_handler {
            Some(handler) => handler(err),
            None => tracing::error!(error = %err, "unhandled scope error"),
        }
    }
}

impl fmt::Debug for ScopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeConfig")
            .field("ttl", &self.ttl)
            .field("failure_policy", &self.failure_policy)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}
