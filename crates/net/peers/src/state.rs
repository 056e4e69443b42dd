//! Lock-free manager lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the peer manager (stored as u8 for atomic operations).
///
/// Moves forward only: `Initial -> Running -> Stopping -> Stopped`. A manager stopped
/// before it ever ran parks in `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ManagerStatus {
    Initial = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ManagerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initial,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ManagerStatus::Running)
    }

    pub fn is_terminating(&self) -> bool {
        matches!(self, ManagerStatus::Stopping | ManagerStatus::Stopped)
    }
}

/// What a stop request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopTransition {
    /// `Running -> Stopping`; the caller must signal the event loop.
    Signal,
    /// `Initial -> Stopping`; there is no loop to signal.
    Quiet,
    /// Already stopping or stopped.
    NoOp,
}

#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn new(status: ManagerStatus) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub(crate) fn load(&self) -> ManagerStatus {
        ManagerStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, status: ManagerStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    pub(crate) fn transition(&self, from: ManagerStatus, to: ManagerStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move into `Stopping`. Exactly one caller ever observes [`StopTransition::Signal`].
    pub(crate) fn begin_stop(&self) -> StopTransition {
        loop {
            let current = self.load();
            let outcome = match current {
                ManagerStatus::Running => StopTransition::Signal,
                ManagerStatus::Initial => StopTransition::Quiet,
                ManagerStatus::Stopping | ManagerStatus::Stopped => return StopTransition::NoOp,
            };
            if self.transition(current, ManagerStatus::Stopping) {
                return outcome;
            }
        }
    }
}
