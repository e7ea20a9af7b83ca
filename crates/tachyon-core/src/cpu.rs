//! Guest CPU shell.
//!
//! Instruction decode and execution belong to the interpreter backend; the
//! scheduler needs a core that can be selected, reset to an entry point, and
//! told to run until a tick target. The shell advances the virtual clock in
//! bounded quanta, fires due timed events, and yields as soon as the run
//! mode leaves `Running` — which is the guarantee the rest of the scheduler
//! relies on for shutdown responsiveness.

use crate::runstate::{RunState, RunStateCell};
use crate::timing::{TimedEventKind, Timing};

/// Largest single step of the virtual clock, in cycles. Keeps the run mode
/// poll interval small relative to a frame (~3.7 M cycles).
const MAX_QUANTUM: u64 = 20_000;

pub struct CpuCore {
    pub pc: u32,
    pub sp: u32,
    cycles_executed: u64,
}

impl CpuCore {
    pub fn new() -> Self {
        CpuCore {
            pc: 0,
            sp: 0,
            cycles_executed: 0,
        }
    }

    pub fn reset(&mut self, entry: u32, stack_top: u32) {
        self.pc = entry;
        self.sp = stack_top;
        self.cycles_executed = 0;
    }

    pub fn cycles_executed(&self) -> u64 {
        self.cycles_executed
    }

    /// Run until the tick counter reaches `target`.
    ///
    /// Returns early when the run mode leaves `Running` — including when one
    /// of this burst's own timed events (vblank) requests the next frame.
    pub fn run_until(&mut self, timing: &mut Timing, run: &RunStateCell, target: u64) {
        while run.get() == RunState::Running {
            let now = timing.now();
            if now >= target {
                break;
            }
            let mut quantum = (target - now).min(MAX_QUANTUM);
            if let Some(to_event) = timing.until_next_event() {
                quantum = quantum.min(to_event);
            }
            if quantum > 0 {
                timing.advance(quantum);
                self.cycles_executed += quantum;
            }
            while let Some(event) = timing.pop_due() {
                self.handle_event(event.kind, timing, run);
            }
        }
    }

    fn handle_event(&mut self, kind: TimedEventKind, timing: &mut Timing, run: &RunStateCell) {
        match kind {
            TimedEventKind::VBlank => {
                timing.schedule(TimedEventKind::VBlank, timing.cycles_per_frame());
                if run.get() == RunState::Running {
                    run.set(RunState::NextFrame);
                }
            }
        }
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc,
            sp: self.sp,
            cycles_executed: self.cycles_executed,
        }
    }

    pub fn restore(&mut self, snapshot: &CpuSnapshot) {
        self.pc = snapshot.pc;
        self.sp = snapshot.sp;
        self.cycles_executed = snapshot.cycles_executed;
    }
}

impl Default for CpuCore {
    fn default() -> Self {
        CpuCore::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuSnapshot {
    pub pc: u32,
    pub sp: u32,
    pub cycles_executed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tachyon_utils::sync::Arc;

    use crate::timing::TickCounter;

    fn setup() -> (CpuCore, Timing, RunStateCell) {
        let mut cpu = CpuCore::new();
        cpu.reset(0x0880_4000, 0x09ff_ff00);
        let timing = Timing::new(222, Arc::new(TickCounter::new()));
        let run = RunStateCell::new();
        run.set(RunState::Running);
        (cpu, timing, run)
    }

    #[test]
    fn test_runs_to_target_when_nothing_intervenes() {
        let (mut cpu, mut timing, run) = setup();
        cpu.run_until(&mut timing, &run, 100_000);
        assert_eq!(timing.now(), 100_000);
        assert_eq!(cpu.cycles_executed(), 100_000);
        assert_eq!(run.get(), RunState::Running);
    }

    #[test]
    fn test_does_not_run_unless_running() {
        let (mut cpu, mut timing, run) = setup();
        run.set(RunState::Stepping);
        cpu.run_until(&mut timing, &run, 100_000);
        assert_eq!(timing.now(), 0);
        assert_eq!(cpu.cycles_executed(), 0);
    }

    #[test]
    fn test_vblank_ends_the_burst_with_next_frame() {
        let (mut cpu, mut timing, run) = setup();
        timing.schedule(TimedEventKind::VBlank, timing.cycles_per_frame());
        let two_frames = timing.cycles_per_frame() * 2;

        cpu.run_until(&mut timing, &run, two_frames);

        assert_eq!(run.get(), RunState::NextFrame);
        // Stopped at the frame boundary, not the requested target.
        assert_eq!(timing.now(), timing.cycles_per_frame());
        // The next vblank is already on the queue.
        assert_eq!(timing.until_next_event(), Some(timing.cycles_per_frame()));
    }

    #[test]
    fn test_resuming_after_next_frame_reaches_the_target() {
        let (mut cpu, mut timing, run) = setup();
        timing.schedule(TimedEventKind::VBlank, timing.cycles_per_frame());
        let target = timing.cycles_per_frame() + 1_000;

        cpu.run_until(&mut timing, &run, target);
        assert_eq!(run.get(), RunState::NextFrame);

        run.set(RunState::Running);
        cpu.run_until(&mut timing, &run, target);
        assert_eq!(timing.now(), target);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut cpu, mut timing, run) = setup();
        cpu.run_until(&mut timing, &run, 50_000);
        let snap = cpu.snapshot();

        cpu.run_until(&mut timing, &run, 80_000);
        cpu.restore(&snap);

        assert_eq!(cpu.pc, 0x0880_4000);
        assert_eq!(cpu.cycles_executed(), 50_000);
    }
}
