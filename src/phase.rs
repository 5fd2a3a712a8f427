use std::cell::Cell;
use std::fmt;

/// Execution phase of a [`Scope`](crate::Scope).
///
/// At most one phase is active per scope. Entering a phase while another one
/// is active fails with [`ScopeError::InProgress`](crate::ScopeError::InProgress).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// A digest loop is running: watch functions, listeners and queued
    /// `eval_async` tasks execute in this phase.
    Digest,
    /// The body of an [`apply`](crate::Scope::apply) callback is running.
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Digest => f.write_str("$digest"),
            Phase::Apply => f.write_str("$apply"),
        }
    }
}

/// RAII guard that clears the phase cell when dropped.
///
/// The guard restores `None` on normal return and during unwinding, so a
/// panicking watch function or listener can never leave the scope stuck in a
/// phase.
pub(crate) struct PhaseGuard<'a> {
    cell: &'a Cell<Option<Phase>>,
}

impl<'a> PhaseGuard<'a> {
    /// Enter `phase`, or hand back the phase that is already active.
    pub(crate) fn enter(cell: &'a Cell<Option<Phase>>, phase: Phase) -> Result<Self, Phase> {
        match cell.get() {
            Some(active) => Err(active),
            None => {
                cell.set(Some(phase));
                Ok(Self { cell })
            }
        }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(None);
    }
}
