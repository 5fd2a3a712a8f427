use crate::compare::{Compare, Watchable};
use crate::scope::Scope;
use std::fmt;

/// Identifier of a watcher within its scope, assigned in registration order.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct WatcherId(u32);

impl WatcherId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Registration index of this watcher.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

pub(crate) type WatchFn<M, V> = Box<dyn FnMut(&Scope<M>) -> V>;
pub(crate) type ListenerFn<M, V> = Box<dyn FnMut(&V, &V, &Scope<M>)>;

/// Type-erased watcher as stored in the scope's watch list.
///
/// A check is split in two so the digest can record dirtiness before the
/// listener runs: a panicking listener then leaves the watcher in the same
/// state as a successful one.
pub(crate) trait WatchEntry<M> {
    fn id(&self) -> WatcherId;

    /// Evaluate the watch function and record the new value if it changed.
    fn poll(&mut self, scope: &Scope<M>) -> bool;

    /// Invoke the listener for the change recorded by the last `poll`.
    fn notify(&mut self, scope: &Scope<M>);
}

/// The change held between `poll` and `notify`.
struct Pending<V> {
    /// Value-mode watchers keep the original here; `last` holds a snapshot.
    fresh: Option<V>,
    /// `None` on the first evaluation.
    previous: Option<V>,
}

pub(crate) struct Watcher<M, V> {
    id: WatcherId,
    watch_fn: WatchFn<M, V>,
    listener: Option<ListenerFn<M, V>>,
    compare: Compare,
    /// `None` until the first evaluation. No watchable value maps to it, so
    /// the first evaluation always counts as a change.
    last: Option<V>,
    pending: Option<Pending<V>>,
}

impl<M, V: Watchable> Watcher<M, V> {
    pub(crate) fn new(
        id: WatcherId,
        watch_fn: WatchFn<M, V>,
        listener: Option<ListenerFn<M, V>>,
        compare: Compare,
    ) -> Self {
        Self {
            id,
            watch_fn,
            listener,
            compare,
            last: None,
            pending: None,
        }
    }
}

impl<M, V: Watchable> WatchEntry<M> for Watcher<M, V> {
    fn id(&self) -> WatcherId {
        self.id
    }

    fn poll(&mut self, scope: &Scope<M>) -> bool {
        let value = (self.watch_fn)(scope);

        if let Some(last) = &self.last
            && self.compare.unchanged(&value, last)
        {
            return false;
        }

        let retained = self.compare.retain(&value);
        let previous = self.last.replace(retained);
        // Without a listener nothing reads the pending change.
        if self.listener.is_some() {
            let fresh = match self.compare {
                Compare::Reference => None,
                Compare::Value => Some(value),
            };
            self.pending = Some(Pending { fresh, previous });
        }
        true
    }

    fn notify(&mut self, scope: &Scope<M>) {
        let Some(Pending { fresh, previous }) = self.pending.take() else {
            return;
        };
        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        let Some(new) = fresh.as_ref().or(self.last.as_ref()) else {
            return;
        };
        // First evaluation reports the new value as the old one as well.
        let old = previous.as_ref().unwrap_or(new);
        listener(new, old, scope);
    }
}
