//! `eval_async` and `apply_async`: work queued relative to the digest cycle.
//!
//! | | joins the running digest | runs on a later turn | coalesced |
//! |---|---|---|---|
//! | `eval_async` | yes | only if no digest is running | one pending digest |
//! | `apply_async` | never | always | one flush per batch |
//!
//! Deferred work holds a weak reference to the scope. If the scope is gone by
//! the time the turn runs, the turn does nothing.

use crate::error::CallbackKind;
use crate::scope::Scope;

impl<M: 'static> Scope<M> {
    /// Queue `task` to run inside the current digest, or the next one.
    ///
    /// If no phase is active and no deferred digest is pending, a digest is
    /// scheduled for a later turn. Calling this from a watch function or
    /// listener never recurses into `digest`: the running digest drains the
    /// queue before it reports convergence.
    pub fn eval_async(&self, task: impl FnOnce(&Scope<M>) + 'static) {
        if self.inner.phase.get().is_none() && !self.inner.async_digest_scheduled.get() {
            self.schedule_async_digest();
        }
        self.inner.async_queue.borrow_mut().push_back(Box::new(task));
    }

    /// Queue `task` to run inside an `apply` on a later turn.
    ///
    /// The task never runs synchronously and never joins the digest that is
    /// running when it is queued. Tasks queued before the flush are drained
    /// together inside a single `apply`, so one digest services the batch.
    /// A task queued from inside a batch waits for the next flush.
    pub fn apply_async(&self, task: impl FnOnce(&Scope<M>) + 'static) {
        self.inner
            .apply_async_queue
            .borrow_mut()
            .push_back(Box::new(task));

        if !self.inner.apply_async_scheduled.get() {
            self.inner.apply_async_scheduled.set(true);
            let generation = self.inner.apply_async_generation.get().wrapping_add(1);
            self.inner.apply_async_generation.set(generation);
            self.schedule_apply_async_flush(generation);
        }
    }

    // ========================================================================
    // Deferred digest
    // ========================================================================

    fn schedule_async_digest(&self) {
        self.inner.async_digest_scheduled.set(true);
        let weak = self.downgrade();
        self.inner.scheduler.schedule(Box::new(move || match Scope::upgrade(&weak) {
            Some(scope) => scope.run_async_digest(),
            None => tracing::debug!("scope dropped before its deferred digest"),
        }));
    }

    fn run_async_digest(&self) {
        self.inner.async_digest_scheduled.set(false);
        if self.pending_async_tasks() == 0 {
            tracing::debug!("eval_async queue already drained");
            return;
        }
        if let Some(phase) = self.phase() {
            tracing::debug!(%phase, "deferring eval_async digest");
            self.schedule_async_digest();
            return;
        }
        if let Err(err) = self.digest() {
            self.report(&err);
        }
    }

    // ========================================================================
    // Deferred apply flush
    // ========================================================================

    fn schedule_apply_async_flush(&self, generation: u64) {
        let weak = self.downgrade();
        self.inner.scheduler.schedule(Box::new(move || match Scope::upgrade(&weak) {
            Some(scope) => scope.run_apply_async_flush(generation),
            None => tracing::debug!("scope dropped before its apply_async flush"),
        }));
    }

    fn run_apply_async_flush(&self, generation: u64) {
        if !self.inner.apply_async_scheduled.get()
            || self.inner.apply_async_generation.get() != generation
        {
            tracing::debug!(generation, "apply_async batch already serviced");
            return;
        }
        if let Some(phase) = self.phase() {
            tracing::debug!(%phase, generation, "deferring apply_async flush");
            self.schedule_apply_async_flush(generation);
            return;
        }
        let flushed = self.apply(|scope| {
            scope.drain_apply_async_queue();
            scope.inner.defer_next_batch.set(true);
        });
        if let Err(err) = flushed {
            self.report(&err);
        }
    }

    /// Close the current batch, then run it.
    ///
    /// Tasks queued by the batch start a new batch with its own flush on a
    /// later turn.
    pub(crate) fn drain_apply_async_queue(&self) {
        let batch = std::mem::take(&mut *self.inner.apply_async_queue.borrow_mut());
        self.inner.apply_async_scheduled.set(false);
        tracing::trace!(tasks = batch.len(), "running apply_async batch");
        for task in batch {
            self.run_callback(CallbackKind::ApplyAsync, || self.eval(task));
        }
    }
}
