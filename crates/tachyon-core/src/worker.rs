//! Lifecycle state machine of the execution worker.
//!
//! The worker owns its state conceptually, but any thread may request a
//! transition: compare-and-set through [`WorkerStateCell::try_transition`] or
//! an unconditional override through [`WorkerStateCell::force`]. Every
//! mutation broadcasts, and every wait re-checks its predicate, so spurious
//! wakeups and racing requests are harmless.

use std::time::Duration;

use tachyon_utils::sync::{Condvar, Mutex};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Initial and terminal: no worker exists. Inline sessions stay here.
    NotRunning,
    /// A worker has been requested but has not claimed its thread yet.
    Pending,
    /// The worker is running one-time bring-up.
    Starting,
    /// Idle between dispatches, waiting for work.
    Running,
    /// Running guest code toward the requested tick target.
    Execute,
    /// Asked to exit; teardown runs before the terminal state.
    Shutdown,
}

impl WorkerState {
    /// States in which the controller may safely proceed: the worker is
    /// either idle or gone.
    pub fn is_ready(self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::NotRunning)
    }

    pub fn is_shutdown(self) -> bool {
        self == WorkerState::NotRunning
    }

    /// Anything but idle is work the dispatch loop has to look at.
    pub fn has_pending_action(self) -> bool {
        self != WorkerState::Running
    }
}

/// Broadcast-on-change cell holding the worker's [`WorkerState`].
pub struct WorkerStateCell {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl WorkerStateCell {
    pub fn new() -> Self {
        WorkerStateCell {
            state: Mutex::new(WorkerState::NotRunning),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Advance `from` to `to` iff the state still equals `from`.
    ///
    /// Returns false and changes nothing when another request got there
    /// first; callers that must win regardless use [`force`](Self::force).
    pub fn try_transition(&self, from: WorkerState, to: WorkerState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        self.changed.notify_all();
        true
    }

    /// Unconditionally overwrite the state. Shutdown and error paths only.
    pub fn force(&self, to: WorkerState) {
        let mut state = self.state.lock();
        *state = to;
        self.changed.notify_all();
    }

    pub fn ready(&self) -> bool {
        self.get().is_ready()
    }

    pub fn shutdown(&self) -> bool {
        self.get().is_shutdown()
    }

    pub fn pending_action(&self) -> bool {
        self.get().has_pending_action()
    }

    /// Block until `pred` holds for the current state.
    ///
    /// Re-checks on every broadcast. Waits are never abandoned; a long stall
    /// only produces a periodic diagnostic.
    pub fn wait_until(&self, pred: impl Fn(WorkerState) -> bool) {
        let mut state = self.state.lock();
        while !pred(*state) {
            let timed_out = self
                .changed
                .wait_for(&mut state, Duration::from_secs(5))
                .timed_out();
            if timed_out && !pred(*state) {
                warn!("still waiting on worker state, currently {:?}", *state);
            }
        }
    }
}

impl Default for WorkerStateCell {
    fn default() -> Self {
        WorkerStateCell::new()
    }
}
