//! Coarse run mode shared by every thread of a session.
//!
//! The cell is a mode signal (pause / resume / power-off / error), not a data
//! channel: all accesses are relaxed atomics and readers poll. Cross-thread
//! handoff of actual work goes through the worker state machine in
//! [`crate::worker`] instead.

use tachyon_utils::sync::{AtomicBool, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    /// Guest code is being executed (or should be, next time the worker is
    /// dispatched).
    Running = 0,
    /// Paused under debugger-style control; bursts return immediately.
    Stepping = 1,
    /// The display reached end-of-frame; control returns to the front end to
    /// present before resuming.
    NextFrame = 2,
    /// Powered off, either never booted or cleanly shut down.
    PowerDown = 3,
    /// A fatal guest or bring-up fault. Sticky across the worker's shutdown
    /// path.
    Error = 4,
}

impl RunState {
    fn from_u8(raw: u8) -> RunState {
        match raw {
            0 => RunState::Running,
            1 => RunState::Stepping,
            2 => RunState::NextFrame,
            3 => RunState::PowerDown,
            _ => RunState::Error,
        }
    }
}

/// Shared run-mode cell plus the pending-transition flag.
#[derive(Debug)]
pub struct RunStateCell {
    state: AtomicU8,
    pending: AtomicBool,
}

impl RunStateCell {
    pub fn new() -> Self {
        RunStateCell {
            state: AtomicU8::new(RunState::PowerDown as u8),
            pending: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Unconditional mode write.
    ///
    /// Raises the pending-transition flag iff the previous mode was `Running`
    /// or `NextFrame` and the new one is not `Running`. That exact rule is
    /// load-bearing: leaving `NextFrame` for `Running` at the top of a frame
    /// must not look like a cancellation to mid-frame work.
    pub fn set(&self, new: RunState) {
        let prev = RunState::from_u8(self.state.swap(new as u8, Ordering::Relaxed));
        if matches!(prev, RunState::Running | RunState::NextFrame) && new != RunState::Running {
            self.pending.store(true, Ordering::Relaxed);
        }
    }

    /// True while a cooperative-cancellation request is outstanding.
    pub fn pending_transition(&self) -> bool {
        self.pending.load(Ordering::Relaxed)
    }

    /// Consume the pending-transition flag, returning whether it was set.
    pub fn acknowledge_transition(&self) -> bool {
        self.pending.swap(false, Ordering::Relaxed)
    }

    /// Drop a leftover pending-transition flag. Session boot only: a
    /// cancellation raised while the previous session shut down must not
    /// carry into the next one.
    pub(crate) fn clear_pending(&self) {
        self.pending.store(false, Ordering::Relaxed);
    }
}

impl Default for RunStateCell {
    fn default() -> Self {
        RunStateCell::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_powered_down() {
        let cell = RunStateCell::new();
        assert_eq!(cell.get(), RunState::PowerDown);
        assert!(!cell.pending_transition());
    }

    #[test]
    fn leaving_running_raises_pending() {
        let cell = RunStateCell::new();
        cell.set(RunState::Running);
        assert!(!cell.pending_transition());

        cell.set(RunState::Stepping);
        assert!(cell.pending_transition());
    }

    #[test]
    fn running_to_next_frame_raises_pending() {
        let cell = RunStateCell::new();
        cell.set(RunState::Running);
        cell.set(RunState::NextFrame);
        assert!(cell.pending_transition());
    }

    #[test]
    fn next_frame_back_to_running_does_not_raise_pending() {
        let cell = RunStateCell::new();
        cell.set(RunState::Running);
        cell.set(RunState::NextFrame);
        cell.acknowledge_transition();

        cell.set(RunState::Running);
        assert!(!cell.pending_transition());
    }

    #[test]
    fn transitions_among_stopped_modes_do_not_raise_pending() {
        let cell = RunStateCell::new();
        cell.set(RunState::Stepping);
        assert!(!cell.pending_transition());

        cell.set(RunState::PowerDown);
        assert!(!cell.pending_transition());

        cell.set(RunState::Error);
        assert!(!cell.pending_transition());
    }

    #[test]
    fn clear_pending_discards_a_stale_flag() {
        let cell = RunStateCell::new();
        cell.set(RunState::Running);
        cell.set(RunState::Error);
        assert!(cell.pending_transition());

        cell.clear_pending();
        assert!(!cell.pending_transition());
    }

    #[test]
    fn acknowledge_consumes_the_flag() {
        let cell = RunStateCell::new();
        cell.set(RunState::Running);
        cell.set(RunState::PowerDown);

        assert!(cell.acknowledge_transition());
        assert!(!cell.pending_transition());
        assert!(!cell.acknowledge_transition());
    }
}
