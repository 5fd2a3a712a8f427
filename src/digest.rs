//! The fixed-point digest loop.
//!
//! A digest alternates between draining the `eval_async` queue and scanning
//! the watch list, until a scan finds nothing dirty and the queue is empty:
//!
//! ```text
//! loop {
//!     drain eval_async queue
//!     pass over watchers (in registration order)
//!     clean pass && empty queue  => converged
//!     passes == ttl              => diverged
//! }
//! ```
//!
//! ## Clean-pass short-circuit
//!
//! The scope remembers the last watcher found dirty. When a later pass comes
//! back around to that watcher and finds it clean, every watcher in between
//! was clean too, so the pass ends there. The confirming pass after a change
//! therefore stops at the changed watcher instead of rescanning the whole
//! list. Registering a watcher resets the marker, so watchers added mid-digest
//! are never skipped.

use crate::error::{CallbackKind, ScopeError};
use crate::phase::Phase;
use crate::scope::Scope;
use crate::watcher::WatcherId;

impl<M: 'static> Scope<M> {
    /// Run watchers until the model is stable.
    ///
    /// Pending `apply_async` work is serviced first, unless this digest was
    /// started by an `apply_async` flush. `eval_async` work queued before or
    /// during the digest runs before it returns.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::InProgress`] if called from inside `digest` or `apply`.
    /// - [`ScopeError::Diverged`] if no clean pass is reached within the
    ///   configured ttl. Watchers keep the values recorded so far.
    ///
    /// # Panics
    ///
    /// Under [`FailurePolicy::Propagate`](crate::FailurePolicy::Propagate) a
    /// panicking callback unwinds out of the digest. The phase is reset first.
    pub fn digest(&self) -> Result<(), ScopeError> {
        let _phase = self.begin_phase(Phase::Digest)?;
        let ttl = self.inner.config.ttl();
        self.inner.last_dirty.set(None);

        let defer_batch = self.inner.defer_next_batch.replace(false);
        if self.inner.apply_async_scheduled.get() && !defer_batch {
            cov_mark::hit!(digest_services_apply_async_batch);
            self.drain_apply_async_queue();
        }

        tracing::trace!(watchers = self.watcher_count(), "digest started");

        let mut fired = Vec::new();
        let mut passes = 0;
        loop {
            self.drain_async_queue();

            fired.clear();
            let dirty = self.digest_once(&mut fired);
            passes += 1;

            let pending_tasks = self.pending_async_tasks();
            if !dirty && pending_tasks == 0 {
                tracing::trace!(passes, "digest converged");
                return Ok(());
            }
            if passes >= ttl {
                tracing::warn!(ttl, dirty = ?fired, pending_tasks, "digest did not converge");
                return Err(ScopeError::Diverged {
                    ttl,
                    dirty_watchers: fired,
                    pending_tasks,
                });
            }
        }
    }

    /// One pass over the watch list. Returns `true` if any watcher was dirty.
    fn digest_once(&self, fired: &mut Vec<WatcherId>) -> bool {
        let mut dirty = false;
        let mut index = 0;
        loop {
            // Re-read the list each step: listeners may append watchers.
            let watcher = self.inner.watchers.borrow().get(index).cloned();
            let Some(watcher) = watcher else {
                break;
            };
            index += 1;

            let id = watcher.borrow().id();
            let changed = self
                .run_callback(CallbackKind::Watch, || watcher.borrow_mut().poll(self))
                .unwrap_or(false);

            if changed {
                dirty = true;
                fired.push(id);
                self.inner.last_dirty.set(Some(id));
                self.run_callback(CallbackKind::Listener, || {
                    watcher.borrow_mut().notify(self);
                });
            } else if self.inner.last_dirty.get() == Some(id) {
                cov_mark::hit!(clean_pass_short_circuit);
                break;
            }
        }
        dirty
    }

    fn drain_async_queue(&self) {
        loop {
            let task = self.inner.async_queue.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            self.run_callback(CallbackKind::EvalAsync, || self.eval(task));
        }
    }
}
