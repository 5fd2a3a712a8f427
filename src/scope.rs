use crate::compare::{Compare, Watchable};
use crate::config::{FailurePolicy, ScopeConfig};
use crate::error::{CallbackKind, ScopeError};
use crate::executor::{Scheduler, default_queue};
use crate::phase::{Phase, PhaseGuard};
use crate::watcher::{ListenerFn, WatchEntry, WatchFn, Watcher, WatcherId};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::{Rc, Weak};

/// Work queued with `eval_async` or `apply_async`.
pub(crate) type Task<M> = Box<dyn FnOnce(&Scope<M>)>;

/// Shared watcher slot. The list is only borrowed long enough to clone a slot
/// out, so callbacks may register new watchers while a digest is running.
pub(crate) type WatcherSlot<M> = Rc<RefCell<dyn WatchEntry<M>>>;

pub(crate) struct ScopeInner<M> {
    pub(crate) model: RefCell<M>,
    pub(crate) watchers: RefCell<Vec<WatcherSlot<M>>>,
    /// Last watcher found dirty in the running digest.
    pub(crate) last_dirty: Cell<Option<WatcherId>>,
    pub(crate) phase: Cell<Option<Phase>>,

    pub(crate) async_queue: RefCell<VecDeque<Task<M>>>,
    pub(crate) async_digest_scheduled: Cell<bool>,

    pub(crate) apply_async_queue: RefCell<VecDeque<Task<M>>>,
    pub(crate) apply_async_scheduled: Cell<bool>,
    /// Identifies the flush that owns the current batch; stale flushes skip.
    pub(crate) apply_async_generation: Cell<u64>,
    /// Set by a flush so the digest it triggers leaves the next batch alone.
    pub(crate) defer_next_batch: Cell<bool>,

    pub(crate) config: ScopeConfig,
    pub(crate) scheduler: Rc<dyn Scheduler>,
}

/// A mutable model plus the watchers observing it.
///
/// `Scope` is a cheap handle: clones share the same model, watch list and
/// queues. Watch functions, listeners and queued tasks receive a `&Scope` and
/// reach the model through [`with`](Scope::with) and [`update`](Scope::update).
///
/// # Example
///
/// ```ignore
/// #[derive(Default)]
/// struct Model { name: String, upper: String }
///
/// let scope = Scope::new(Model::default());
/// scope.watch(
///     |s| s.with(|m| m.name.clone()),
///     |name, _old, s| s.update(|m| m.upper = name.to_uppercase()),
/// );
///
/// scope.apply(|s| s.update(|m| m.name = "ada".into()))?;
/// assert_eq!(scope.with(|m| m.upper.clone()), "ADA");
/// ```
pub struct Scope<M> {
    pub(crate) inner: Rc<ScopeInner<M>>,
}

impl<M> Clone for Scope<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: 'static> Scope<M> {
    /// Create a scope with the default configuration, scheduling deferred work
    /// on the thread-local turn queue.
    pub fn new(model: M) -> Self {
        Self::with_config(model, ScopeConfig::default())
    }

    /// Create a scope with a custom configuration on the thread-local turn queue.
    pub fn with_config(model: M, config: ScopeConfig) -> Self {
        Self::with_scheduler(model, config, default_queue())
    }

    /// Create a scope that hands deferred work to `scheduler`.
    pub fn with_scheduler(model: M, config: ScopeConfig, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                model: RefCell::new(model),
                watchers: RefCell::new(Vec::new()),
                last_dirty: Cell::new(None),
                phase: Cell::new(None),
                async_queue: RefCell::new(VecDeque::new()),
                async_digest_scheduled: Cell::new(false),
                apply_async_queue: RefCell::new(VecDeque::new()),
                apply_async_scheduled: Cell::new(false),
                apply_async_generation: Cell::new(0),
                defer_next_batch: Cell::new(false),
                config,
                scheduler,
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<ScopeInner<M>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner<M>> {
        Rc::downgrade(&self.inner)
    }

    // ========================================================================
    // Model access
    // ========================================================================

    /// Read the model.
    ///
    /// # Panics
    ///
    /// Panics if called from inside [`update`](Scope::update) on the same scope.
    pub fn with<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.inner.model.borrow())
    }

    /// Mutate the model. Watchers see the change on the next digest.
    ///
    /// # Panics
    ///
    /// Panics if called from inside [`with`](Scope::with) or `update` on the
    /// same scope.
    pub fn update<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.model.borrow_mut())
    }

    // ========================================================================
    // Watch registration
    // ========================================================================

    /// Register a reference-mode watcher.
    ///
    /// `watch_fn` is evaluated on every digest pass. When its result is not
    /// [identical](Watchable::identical) to the previous one, `listener` runs
    /// with `(new, old, scope)`. On the first evaluation `old` is `new`.
    pub fn watch<V, W, L>(&self, watch_fn: W, listener: L) -> WatcherId
    where
        V: Watchable,
        W: FnMut(&Scope<M>) -> V + 'static,
        L: FnMut(&V, &V, &Scope<M>) + 'static,
    {
        self.register(Box::new(watch_fn), Some(Box::new(listener)), Compare::Reference)
    }

    /// Register a value-mode watcher: composites are compared structurally
    /// against a snapshot, so in-place mutation counts as a change.
    pub fn watch_by_value<V, W, L>(&self, watch_fn: W, listener: L) -> WatcherId
    where
        V: Watchable,
        W: FnMut(&Scope<M>) -> V + 'static,
        L: FnMut(&V, &V, &Scope<M>) + 'static,
    {
        self.register(Box::new(watch_fn), Some(Box::new(listener)), Compare::Value)
    }

    /// Register a watcher without a listener.
    ///
    /// The watch function still runs on every pass and its changes still keep
    /// the digest going.
    pub fn observe<V, W>(&self, watch_fn: W) -> WatcherId
    where
        V: Watchable,
        W: FnMut(&Scope<M>) -> V + 'static,
    {
        self.register(Box::new(watch_fn), None, Compare::Reference)
    }

    /// Register a watcher with every option spelled out.
    pub fn watch_with<V, W, L>(&self, watch_fn: W, listener: Option<L>, compare: Compare) -> WatcherId
    where
        V: Watchable,
        W: FnMut(&Scope<M>) -> V + 'static,
        L: FnMut(&V, &V, &Scope<M>) + 'static,
    {
        let listener = listener.map(|l| Box::new(l) as ListenerFn<M, V>);
        self.register(Box::new(watch_fn), listener, compare)
    }

    fn register<V: Watchable>(
        &self,
        watch_fn: WatchFn<M, V>,
        listener: Option<ListenerFn<M, V>>,
        compare: Compare,
    ) -> WatcherId {
        let mut watchers = self.inner.watchers.borrow_mut();
        let id = WatcherId::new(watchers.len() as u32);
        watchers.push(Rc::new(RefCell::new(Watcher::new(
            id, watch_fn, listener, compare,
        ))));
        // A watcher added mid-digest must not be skipped by the short-circuit.
        self.inner.last_dirty.set(None);
        id
    }

    // ========================================================================
    // Synchronous evaluation
    // ========================================================================

    /// Run `f` against this scope and return its result. Does not digest.
    pub fn eval<R>(&self, f: impl FnOnce(&Scope<M>) -> R) -> R {
        f(self)
    }

    /// Like [`eval`](Scope::eval), passing an extra argument through.
    pub fn eval_with<A, R>(&self, f: impl FnOnce(&Scope<M>, A) -> R, args: A) -> R {
        f(self, args)
    }

    /// Run `f` in the apply phase, then digest once.
    ///
    /// The digest runs even if `f` panics; the panic is resumed afterwards.
    /// If that digest panics as well, the panic from `f` is reported to the
    /// error handler and the digest's panic unwinds instead.
    ///
    /// # Errors
    ///
    /// [`ScopeError::InProgress`] if a phase is already active (nothing runs),
    /// or the digest's error.
    pub fn apply<R>(&self, f: impl FnOnce(&Scope<M>) -> R) -> Result<R, ScopeError> {
        let outcome = {
            let _phase = self.begin_phase(Phase::Apply)?;
            catch_unwind(AssertUnwindSafe(|| f(self)))
        };
        let payload = match outcome {
            Ok(value) => return self.digest().map(|()| value),
            Err(payload) => payload,
        };
        match catch_unwind(AssertUnwindSafe(|| self.digest())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report(&err),
            Err(digest_payload) => {
                self.report(&ScopeError::from_panic(CallbackKind::Apply, payload.as_ref()));
                resume_unwind(digest_payload)
            }
        }
        resume_unwind(payload)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// The active phase, or `None` outside `digest` and `apply`.
    pub fn phase(&self) -> Option<Phase> {
        self.inner.phase.get()
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    /// Tasks waiting in the `eval_async` queue.
    pub fn pending_async_tasks(&self) -> usize {
        self.inner.async_queue.borrow().len()
    }

    /// Tasks waiting in the `apply_async` queue.
    pub fn pending_apply_async_tasks(&self) -> usize {
        self.inner.apply_async_queue.borrow().len()
    }

    /// Returns `true` while an `apply_async` flush is scheduled.
    pub fn is_apply_async_scheduled(&self) -> bool {
        self.inner.apply_async_scheduled.get()
    }

    /// The configuration this scope was created with.
    pub fn config(&self) -> &ScopeConfig {
        &self.inner.config
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    pub(crate) fn begin_phase(&self, phase: Phase) -> Result<PhaseGuard<'_>, ScopeError> {
        PhaseGuard::enter(&self.inner.phase, phase).map_err(|active| {
            tracing::warn!(requested = %phase, %active, "reentrant scope phase");
            ScopeError::InProgress(active)
        })
    }

    /// Run a caller-supplied callback under the configured failure policy.
    ///
    /// Returns `None` if the callback panicked and the panic was isolated.
    pub(crate) fn run_callback<R>(&self, kind: CallbackKind, f: impl FnOnce() -> R) -> Option<R> {
        match self.inner.config.failure_policy() {
            FailurePolicy::Propagate => Some(f()),
            FailurePolicy::Isolate => match catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => Some(value),
                Err(payload) => {
                    self.report(&ScopeError::from_panic(kind, payload.as_ref()));
                    None
                }
            },
        }
    }

    pub(crate) fn report(&self, err: &ScopeError) {
        self.inner.config.report(err);
    }
}

impl<M: fmt::Debug> fmt::Debug for Scope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Scope");
        match self.inner.model.try_borrow() {
            Ok(model) => s.field("model", &*model),
            Err(_) => s.field("model", &"<borrowed>"),
        };
        s.field("phase", &self.inner.phase.get())
            .field("watchers", &self.inner.watchers.borrow().len())
            .field("async_queue", &self.inner.async_queue.borrow().len())
            .field("apply_async_queue", &self.inner.apply_async_queue.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::catch_unwind;

    #[test]
    fn clones_share_the_model() {
        let scope = Scope::new(1);
        let alias = scope.clone();
        alias.update(|m| *m = 2);
        assert_eq!(scope.with(|m| *m), 2);
    }

    #[test]
    fn eval_returns_result_without_digesting() {
        let scope = Scope::new(42);
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        scope.watch(|s| s.with(|m| *m), move |_, _, _| counter.set(counter.get() + 1));

        assert_eq!(scope.eval(|s| s.with(|m| *m)), 42);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn eval_with_passes_extra_argument() {
        let scope = Scope::new(40);
        let sum = scope.eval_with(|s, extra: i32| s.with(|m| m + extra), 2);
        assert_eq!(sum, 42);
    }

    #[test]
    fn watcher_ids_follow_registration_order() {
        let scope = Scope::new(());
        let first = scope.observe(|_| 1);
        let second = scope.observe(|_| 2);
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(scope.watcher_count(), 2);
    }

    #[test]
    fn apply_rejects_reentry_without_running_body() {
        let scope = Scope::new(0);
        let nested = scope.apply(|s| s.apply(|s| s.update(|m| *m += 1)));

        assert_eq!(nested, Ok(Err(ScopeError::InProgress(Phase::Apply))));
        assert_eq!(scope.with(|m| *m), 0);
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn apply_digests_even_when_body_panics() {
        let scope = Scope::new(0);
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        scope.watch(|s| s.with(|m| *m), move |_, _, _| counter.set(counter.get() + 1));

        let result = catch_unwind(AssertUnwindSafe(|| {
            scope.apply(|s| {
                s.update(|m| *m = 5);
                panic!("apply body failed");
            })
        }));

        assert!(result.is_err());
        assert_eq!(fired.get(), 1);
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn debug_output_survives_borrowed_model() {
        let scope = Scope::new(7);
        let text = scope.update(|_| format!("{scope:?}"));
        assert!(text.contains("<borrowed>"));
        assert!(format!("{scope:?}").contains("model: 7"));
    }
}
