//! Turn scheduling for deferred scope work.
//!
//! `eval_async` and `apply_async` never run their work synchronously. They ask
//! a [`Scheduler`] to run a callback on a later *turn*, after the current
//! synchronous extent has finished. The host event loop decides what a turn
//! is; this module defines the seam and a reference implementation:
//!
//! - [`Scheduler`]: the host capability, "run this once, later".
//! - [`TurnQueue`]: a FIFO of turns that the host drains explicitly.
//! - A thread-local default queue used by [`Scope::new`](crate::Scope::new),
//!   drained with [`run_next_turn`] / [`run_pending_turns`].
//!
//! ## Usage
//!
//! ```ignore
//! let scope = Scope::new(Model::default());
//! scope.apply_async(|s| s.update(|m| m.count += 1));
//!
//! // Later, from the host event loop:
//! run_pending_turns();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A unit of deferred work handed to a [`Scheduler`].
pub type Turn = Box<dyn FnOnce()>;

/// Upper bound on turns run by [`run_pending_turns`].
///
/// Turns may schedule more turns; the limit stops a self-rescheduling chain
/// from spinning forever.
pub const DEFAULT_TURN_LIMIT: usize = 10_000;

/// Host capability for running work on a later turn.
///
/// Implementations must not run `turn` synchronously inside `schedule`. No
/// ordering relative to other scheduled work is required beyond "later, once".
pub trait Scheduler {
    /// Run `turn` once, after the current synchronous extent completes.
    fn schedule(&self, turn: Turn);
}

impl<F> Scheduler for F
where
    F: Fn(Turn),
{
    fn schedule(&self, turn: Turn) {
        self(turn)
    }
}

/// FIFO queue of turns drained by the host.
#[derive(Default)]
pub struct TurnQueue {
    pending: RefCell<VecDeque<Turn>>,
}

impl TurnQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue behind an `Rc`, ready to hand to scopes.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Number of turns waiting to run.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Returns `true` when no turns are waiting.
    pub fn is_idle(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Run every turn that was queued before this call started.
    ///
    /// Turns scheduled while these run are left for the next call. Returns the
    /// number of turns run.
    pub fn run_turn(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        let count = batch.len();
        for turn in batch {
            turn();
        }
        count
    }

    /// Run turns until the queue is idle or `limit` turns have run.
    ///
    /// Returns the number of turns run.
    pub fn run_until_idle(&self, limit: usize) -> usize {
        let mut ran = 0;
        while ran < limit {
            let turn = self.pending.borrow_mut().pop_front();
            let Some(turn) = turn else {
                return ran;
            };
            turn();
            ran += 1;
        }
        if !self.is_idle() {
            tracing::warn!(limit, pending = self.len(), "turn limit reached with work queued");
        }
        ran
    }
}

impl Scheduler for TurnQueue {
    fn schedule(&self, turn: Turn) {
        self.pending.borrow_mut().push_back(turn);
    }
}

thread_local! {
    static DEFAULT_QUEUE: Rc<TurnQueue> = TurnQueue::shared();
}

/// The thread-local queue used by [`Scope::new`](crate::Scope::new).
pub fn default_queue() -> Rc<TurnQueue> {
    DEFAULT_QUEUE.with(Rc::clone)
}

/// Run one turn of the thread-local queue. Returns the number of turns run.
pub fn run_next_turn() -> usize {
    default_queue().run_turn()
}

/// Drain the thread-local queue, up to [`DEFAULT_TURN_LIMIT`] turns.
pub fn run_pending_turns() -> usize {
    default_queue().run_until_idle(DEFAULT_TURN_LIMIT)
}

/// Returns `true` if the thread-local queue has work waiting.
pub fn has_pending_turns() -> bool {
    !default_queue().is_idle()
}
