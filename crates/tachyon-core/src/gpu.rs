//! GPU context: lifecycle and the cross-thread event queue.
//!
//! Command processing and rendering live in the graphics backend; what the
//! scheduler needs from the GPU is (a) an init/shutdown lifecycle owned by
//! the session and (b) an event queue the orchestrating thread can keep
//! draining while the worker runs guest code, so cross-subsystem
//! notifications never back up behind a busy CPU.

use std::collections::VecDeque;
use std::time::Duration;

use tachyon_utils::sync::{AtomicU64, Condvar, Mutex, Ordering};

use crate::timing::TickCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuEvent {
    /// The pacer is about to dispatch a new frame's worth of execution.
    BeginFrame,
    /// The worker finished its burst; the current drain should return.
    FinishDrain,
}

struct GpuInner {
    queue: VecDeque<GpuEvent>,
    initialized: bool,
}

pub struct GpuContext {
    inner: Mutex<GpuInner>,
    posted: Condvar,
    frames_begun: AtomicU64,
    events_processed: AtomicU64,
}

impl GpuContext {
    pub fn new() -> Self {
        GpuContext {
            inner: Mutex::new(GpuInner {
                queue: VecDeque::new(),
                initialized: false,
            }),
            posted: Condvar::new(),
            frames_begun: AtomicU64::new(0),
            events_processed: AtomicU64::new(0),
        }
    }

    pub fn init(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.initialized = true;
    }

    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        inner.initialized = false;
        // Wake any drain blocked on the queue so it observes the shutdown.
        self.posted.notify_all();
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    pub fn post(&self, event: GpuEvent) {
        let mut inner = self.inner.lock();
        inner.queue.push_back(event);
        self.posted.notify_all();
    }

    /// Announce the next frame to the backend before execution is dispatched.
    pub fn sync_begin_frame(&self) {
        self.frames_begun.fetch_add(1, Ordering::Relaxed);
        self.post(GpuEvent::BeginFrame);
    }

    /// Called by the worker after a burst; makes the in-flight
    /// [`run_events_until`](Self::run_events_until) return promptly instead
    /// of sleeping out its slice.
    pub fn finish_event_loop(&self) {
        self.post(GpuEvent::FinishDrain);
    }

    /// Drain queued events until the virtual `deadline` passes, the worker
    /// signals the end of its burst, or a short wall-clock lull elapses with
    /// nothing queued. Never blocks unboundedly: the caller re-checks worker
    /// readiness between slices.
    pub fn run_events_until(&self, ticks: &TickCounter, deadline: u64) {
        let mut inner = self.inner.lock();
        loop {
            if !inner.initialized {
                return;
            }
            while let Some(event) = inner.queue.pop_front() {
                self.events_processed.fetch_add(1, Ordering::Relaxed);
                if event == GpuEvent::FinishDrain {
                    return;
                }
            }
            if ticks.now() >= deadline {
                return;
            }
            let timed_out = self
                .posted
                .wait_for(&mut inner, Duration::from_millis(2))
                .timed_out();
            if timed_out && inner.queue.is_empty() {
                return;
            }
        }
    }

    pub fn frames_begun(&self) -> u64 {
        self.frames_begun.load(Ordering::Relaxed)
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }
}

impl Default for GpuContext {
    fn default() -> Self {
        GpuContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tachyon_utils::sync::Arc;

    #[test]
    fn test_drain_returns_on_finish_signal() {
        let gpu = GpuContext::new();
        gpu.init();
        let ticks = TickCounter::new();

        gpu.sync_begin_frame();
        gpu.finish_event_loop();
        // Deadline far in the future; the finish event must end the drain.
        gpu.run_events_until(&ticks, u64::MAX);

        assert_eq!(gpu.frames_begun(), 1);
        assert_eq!(gpu.events_processed(), 2);
    }

    #[test]
    fn test_drain_returns_once_deadline_passed() {
        let gpu = GpuContext::new();
        gpu.init();
        let ticks = TickCounter::new();
        ticks.advance(500);

        gpu.run_events_until(&ticks, 400);
        assert_eq!(gpu.events_processed(), 0);
    }

    #[test]
    fn test_drain_on_uninitialized_context_is_a_no_op() {
        let gpu = GpuContext::new();
        let ticks = TickCounter::new();
        gpu.run_events_until(&ticks, u64::MAX);
        assert_eq!(gpu.events_processed(), 0);
    }

    #[test]
    fn test_cross_thread_finish_wakes_a_blocked_drain() {
        let gpu = Arc::new(GpuContext::new());
        gpu.init();

        let poster = {
            let gpu = gpu.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                gpu.finish_event_loop();
            })
        };

        let ticks = TickCounter::new();
        // Virtual deadline never reached; returns via the posted event (or,
        // at worst, a wall-clock lull followed by re-entry).
        let start = std::time::Instant::now();
        while gpu.events_processed() == 0 && start.elapsed() < Duration::from_secs(5) {
            gpu.run_events_until(&ticks, u64::MAX);
        }

        poster.join().unwrap();
        assert_eq!(gpu.events_processed(), 1);
    }

    #[test]
    fn test_shutdown_clears_lifecycle() {
        let gpu = GpuContext::new();
        gpu.init();
        assert!(gpu.is_initialized());
        gpu.post(GpuEvent::BeginFrame);

        gpu.shutdown();
        assert!(!gpu.is_initialized());

        // Queued events were dropped with the context.
        let ticks = TickCounter::new();
        gpu.run_events_until(&ticks, u64::MAX);
        assert_eq!(gpu.events_processed(), 0);
    }
}
