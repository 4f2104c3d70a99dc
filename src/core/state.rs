// src/core/state.rs

//! The lifecycle state machine, implemented as a single atomic cell so the
//! cluster-change callback, the poller, and caller threads can all observe
//! and transition it without locking.

use std::sync::atomic::{AtomicU8, Ordering};

use strum_macros::Display;

/// The lifecycle state of a `NativeUserStore`.
///
/// Transitions are irreversible within a lifecycle except via the test-only
/// `reset()`: `Initialized -> Starting -> Started -> Stopping -> Stopped`;
/// any stage may move to `Failed`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Initialized = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
    Stopped = 4,
    Failed = 5,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Initialized,
            1 => LifecycleState::Starting,
            2 => LifecycleState::Started,
            3 => LifecycleState::Stopping,
            4 => LifecycleState::Stopped,
            5 => LifecycleState::Failed,
            other => unreachable!("invalid lifecycle state discriminant: {other}"),
        }
    }
}

/// A lock-free cell holding the current `LifecycleState`.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: LifecycleState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Atomically transitions from `from` to `to`. Returns `true` if the
    /// transition was applied, `false` if the current state was not `from`
    /// (an illegal transition is rejected silently, matching `start`/`stop`
    /// behavior in the source).
    pub fn compare_and_transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Unconditionally forces the state, used when an operation fails partway
    /// through and must move to `Failed` regardless of the state it started in.
    pub fn force(&self, to: LifecycleState) {
        self.0.store(to as u8, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.get() == LifecycleState::Started
    }

    pub fn is_stopping_or_stopped(&self) -> bool {
        matches!(
            self.get(),
            LifecycleState::Stopping | LifecycleState::Stopped
        )
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(LifecycleState::Initialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_and_transition_succeeds_on_matching_state() {
        let cell = StateCell::new(LifecycleState::Initialized);
        assert!(cell.compare_and_transition(LifecycleState::Initialized, LifecycleState::Starting));
        assert_eq!(cell.get(), LifecycleState::Starting);
    }

    #[test]
    fn compare_and_transition_is_rejected_silently_on_mismatch() {
        let cell = StateCell::new(LifecycleState::Started);
        assert!(!cell.compare_and_transition(LifecycleState::Initialized, LifecycleState::Starting));
        assert_eq!(cell.get(), LifecycleState::Started);
    }

    #[test]
    fn force_overrides_regardless_of_current_state() {
        let cell = StateCell::new(LifecycleState::Starting);
        cell.force(LifecycleState::Failed);
        assert_eq!(cell.get(), LifecycleState::Failed);
    }
}
