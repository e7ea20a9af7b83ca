//! Virtual clock and timed hardware events.
//!
//! All pacing in the emulator is expressed in cycles of the guest CPU clock
//! (222 MHz stock, 333 MHz overclocked). The current tick lives in a shared
//! [`TickCounter`] so the orchestrating thread can compute GPU drain slices
//! while the worker is mid-burst without taking the machine lock.

use tachyon_utils::sync::{Arc, AtomicU64, Ordering};

/// Display refresh, in hundredths of Hz. The panel runs at 59.94 Hz.
const REFRESH_RATE_CENTIHZ: u64 = 5994;

/// Lock-free view of the current virtual time.
///
/// Written by the timing subsystem as the CPU advances, read by any thread.
/// Reads are relaxed: a slightly stale tick only makes a GPU drain slice
/// start a little early or late.
#[derive(Debug)]
pub struct TickCounter(AtomicU64);

impl TickCounter {
    pub fn new() -> Self {
        TickCounter(AtomicU64::new(0))
    }

    pub fn now(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn advance(&self, cycles: u64) {
        self.0.fetch_add(cycles, Ordering::Relaxed);
    }

    pub(crate) fn set(&self, ticks: u64) {
        self.0.store(ticks, Ordering::Relaxed);
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        TickCounter::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedEventKind {
    /// End-of-frame display refresh; reschedules itself every frame.
    VBlank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEvent {
    pub deadline: u64,
    pub kind: TimedEventKind,
}

/// The timing subsystem: owns the tick counter and the due-event queue.
pub struct Timing {
    ticks: Arc<TickCounter>,
    cycles_per_second: u64,
    /// Sorted ascending by deadline; the front is always the next event.
    events: Vec<TimedEvent>,
}

impl Timing {
    pub fn new(clock_mhz: u32, ticks: Arc<TickCounter>) -> Self {
        ticks.set(0);
        Timing {
            ticks,
            cycles_per_second: u64::from(clock_mhz) * 1_000_000,
            events: Vec::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.ticks.now()
    }

    pub fn set_clock_mhz(&mut self, mhz: u32) {
        self.cycles_per_second = u64::from(mhz) * 1_000_000;
    }

    pub fn ms_to_cycles(&self, ms: u64) -> u64 {
        self.cycles_per_second / 1000 * ms
    }

    pub fn us_to_cycles(&self, us: u64) -> u64 {
        self.cycles_per_second / 1_000_000 * us
    }

    pub fn cycles_per_frame(&self) -> u64 {
        self.cycles_per_second * 100 / REFRESH_RATE_CENTIHZ
    }

    /// Schedule `kind` to fire `cycles_from_now` cycles in the future.
    pub fn schedule(&mut self, kind: TimedEventKind, cycles_from_now: u64) {
        let event = TimedEvent {
            deadline: self.now() + cycles_from_now,
            kind,
        };
        let at = self
            .events
            .partition_point(|e| e.deadline <= event.deadline);
        self.events.insert(at, event);
    }

    /// Cycles until the next scheduled event, if any.
    pub fn until_next_event(&self) -> Option<u64> {
        let next = self.events.first()?;
        Some(next.deadline.saturating_sub(self.now()))
    }

    /// Advance virtual time. Fired events are collected through
    /// [`pop_due`](Self::pop_due), not dispatched here.
    pub fn advance(&mut self, cycles: u64) {
        self.ticks.advance(cycles);
    }

    /// Take the next event whose deadline has been reached.
    pub fn pop_due(&mut self) -> Option<TimedEvent> {
        if self.events.first()?.deadline <= self.now() {
            Some(self.events.remove(0))
        } else {
            None
        }
    }

    /// Drop all scheduled events and rewind the clock.
    pub fn shutdown(&mut self) {
        self.events.clear();
        self.ticks.set(0);
    }

    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            ticks: self.now(),
            cycles_per_second: self.cycles_per_second,
            events: self.events.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &TimingSnapshot) {
        self.ticks.set(snapshot.ticks);
        self.cycles_per_second = snapshot.cycles_per_second;
        self.events = snapshot.events.clone();
    }
}

#[derive(Debug, Clone)]
pub struct TimingSnapshot {
    pub ticks: u64,
    pub cycles_per_second: u64,
    pub events: Vec<TimedEvent>,
}
