//! Save-state request queue.
//!
//! Snapshot and restore requests arrive from the front end at arbitrary
//! times, but may only be applied while the machine is idle. The pacer
//! drains this queue exactly once per advance, before any execution is
//! dispatched, so a restore takes effect before further instructions run.
//! The on-disk serialization format belongs to a different layer; the slot
//! here is in-memory.

use std::collections::VecDeque;

use tachyon_utils::sync::Mutex;
use tracing::info;

use crate::cpu::{CpuCore, CpuSnapshot};
use crate::error::SaveStateError;
use crate::timing::{Timing, TimingSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStateRequest {
    Snapshot,
    Restore,
}

#[derive(Debug, Clone)]
struct MachineSnapshot {
    cpu: CpuSnapshot,
    timing: TimingSnapshot,
    ram_size: u32,
}

#[derive(Default)]
struct HubInner {
    requests: VecDeque<SaveStateRequest>,
    slot: Option<MachineSnapshot>,
    last_error: Option<SaveStateError>,
}

#[derive(Default)]
pub struct SaveStateHub {
    inner: Mutex<HubInner>,
}

impl SaveStateHub {
    pub fn new() -> Self {
        SaveStateHub::default()
    }

    /// Queue a request; it is applied on the next pacer advance.
    pub fn request(&self, request: SaveStateRequest) {
        self.inner.lock().requests.push_back(request);
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.lock().requests.is_empty()
    }

    pub fn has_snapshot(&self) -> bool {
        self.inner.lock().slot.is_some()
    }

    /// Error from the most recent processed request, cleared on success.
    pub fn last_error(&self) -> Option<SaveStateError> {
        self.inner.lock().last_error.clone()
    }

    /// Apply every queued request against the idle machine.
    pub fn process_pending(&self, cpu: &mut CpuCore, timing: &mut Timing, ram_size: u32) {
        let mut inner = self.inner.lock();
        while let Some(request) = inner.requests.pop_front() {
            let result = match request {
                SaveStateRequest::Snapshot => {
                    inner.slot = Some(MachineSnapshot {
                        cpu: cpu.snapshot(),
                        timing: timing.snapshot(),
                        ram_size,
                    });
                    info!("machine snapshot taken at tick {}", timing.now());
                    Ok(())
                }
                SaveStateRequest::Restore => match &inner.slot {
                    Some(snapshot) if snapshot.ram_size == ram_size => {
                        cpu.restore(&snapshot.cpu);
                        timing.restore(&snapshot.timing);
                        info!("machine restored to tick {}", timing.now());
                        Ok(())
                    }
                    Some(_) => Err(SaveStateError::Unavailable),
                    None => Err(SaveStateError::Empty),
                },
            };
            inner.last_error = result.err();
        }
    }

    /// Drop queued requests and the snapshot slot. Session teardown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.requests.clear();
        inner.slot = None;
        inner.last_error = None;
    }
}
