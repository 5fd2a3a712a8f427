#![deny(missing_docs)]

//! Dirty-checking reactive state with a fixed-point digest loop.
//!
//! A [`Scope`] owns a model and a list of watchers. Each watcher pairs a
//! *watch function*, which reads something from the model, with a *listener*
//! that reacts when that value changes. Nothing is tracked automatically:
//! [`digest`](Scope::digest) re-evaluates every watch function, compares the
//! result against the previous one, and fires listeners, repeating until a
//! pass finds nothing dirty.
//!
//! # Quick Start
//!
//! ```ignore
//! use dirtycheck::{Scope, run_pending_turns};
//!
//! #[derive(Default)]
//! struct Model {
//!     name: String,
//!     initial: String,
//! }
//!
//! let scope = Scope::new(Model::default());
//!
//! scope.watch(
//!     |s| s.with(|m| m.name.clone()),
//!     |name, _old, s| s.update(|m| m.initial = name.chars().take(1).collect()),
//! );
//!
//! // Mutate, then propagate
//! scope.apply(|s| s.update(|m| m.name = "ashish".into()))?;
//! assert_eq!(scope.with(|m| m.initial.clone()), "a");
//!
//! // Defer work to a later turn of the host loop
//! scope.apply_async(|s| s.update(|m| m.name = "bob".into()));
//! run_pending_turns();
//! ```
//!
//! # Core Types
//!
//! - [`Scope`] - Model plus watch list. Cheap to clone; clones share state.
//! - [`Watchable`] - Reference and structural equality for watched values.
//! - [`Compare`] - Per-watcher comparison mode.
//! - [`Value`] / [`Properties`] - Schema-free model for dynamic callers.
//! - [`ScopeConfig`] - Iteration budget, failure policy, error handler.
//! - [`Scheduler`] / [`TurnQueue`] - Where deferred work runs.
//!
//! # Scheduling
//!
//! ```ignore
//! scope.eval(|s| ...);        // Run now, no digest
//! scope.apply(|s| ...)?;      // Run now, then digest once
//! scope.eval_async(|s| ...);  // Run inside the current or next digest
//! scope.apply_async(|s| ...); // Run on a later turn, batched, then digest
//! scope.digest()?;            // Propagate until stable
//! ```
//!
//! # Comparison Modes
//!
//! ```ignore
//! let list = Rc::new(RefCell::new(vec![1, 2, 3]));
//!
//! // Reference mode: fires when a *different* list is returned
//! scope.watch(move |_| list.clone(), |_, _, _| {});
//!
//! // Value mode: also fires when the same list is edited in place
//! scope.watch_by_value(move |_| list.clone(), |_, _, _| {});
//! ```
//!
//! NaN compares equal to itself in both modes.
//!
//! # Failures
//!
//! - A digest that has not settled after `ttl` passes (default 10) returns
//!   [`ScopeError::Diverged`].
//! - Calling `digest` or `apply` from inside either returns
//!   [`ScopeError::InProgress`].
//! - A panicking callback either unwinds out of the digest or is isolated and
//!   reported, depending on [`FailurePolicy`]. The phase is reset either way.

mod compare;
mod config;
mod digest;
mod error;
mod executor;
mod hash;
mod phase;
mod queue;
mod scope;
mod value;
mod watcher;

// Core types
pub use scope::Scope;
pub use watcher::WatcherId;

// Change detection
pub use compare::{Compare, Watchable, numbers_equal};
pub use value::{Properties, Value};

// Configuration and errors
pub use config::{DEFAULT_TTL, FailurePolicy, ScopeConfig};
pub use error::{CallbackKind, ScopeError};
pub use phase::Phase;

// Host scheduling (for custom event loops)
pub use executor::{
    DEFAULT_TURN_LIMIT, Scheduler, Turn, TurnQueue, default_queue, has_pending_turns,
    run_next_turn, run_pending_turns,
};
pub use hash::{FastHashBuilder, PropertyMap};
