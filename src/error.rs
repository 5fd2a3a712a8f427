//! Error types reported by a [`Scope`](crate::Scope).

use crate::phase::Phase;
use crate::watcher::WatcherId;
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Failures surfaced by the digest engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The digest ran out of passes before reaching a clean one.
    #[error(
        "{ttl} digest iterations reached without a clean pass \
         (dirty in last pass: {dirty_watchers:?}, queued tasks: {pending_tasks})"
    )]
    Diverged {
        /// Iteration budget that was exhausted.
        ttl: usize,
        /// Watchers that were still dirty in the final pass.
        dirty_watchers: Vec<WatcherId>,
        /// `eval_async` tasks still queued when the digest gave up.
        pending_tasks: usize,
    },

    /// `digest` or `apply` was called while the scope was already in a phase.
    #[error("{0} already in progress")]
    InProgress(Phase),

    /// A caller-supplied callback panicked and the panic was isolated, or was
    /// superseded by a later panic before it could unwind.
    #[error("{kind} panicked: {message}")]
    CallbackPanicked {
        /// Which kind of callback failed.
        kind: CallbackKind,
        /// Panic payload rendered as text.
        message: String,
    },
}

impl ScopeError {
    pub(crate) fn from_panic(kind: CallbackKind, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        ScopeError::CallbackPanicked { kind, message }
    }
}

/// The kind of caller-supplied callback that was running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    /// A watch function.
    Watch,
    /// A listener reacting to a changed value.
    Listener,
    /// A task queued with `eval_async`.
    EvalAsync,
    /// A task queued with `apply_async`.
    ApplyAsync,
    /// The body of an `apply` call.
    Apply,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackKind::Watch => "watch function",
            CallbackKind::Listener => "listener",
            CallbackKind::EvalAsync => "eval_async task",
            CallbackKind::ApplyAsync => "apply_async task",
            CallbackKind::Apply => "apply body",
        };
        f.write_str(name)
    }
}
