//! Cross-thread scheduler scenarios: threaded start/stop, pacing, and
//! session restarts. Everything runs against fixture programs synthesized
//! into a scratch directory, so no binaries are checked in.

use std::fs;
use std::path::{Path, PathBuf};

use tachyon_core::audio::{AudioHost, StereoMixer};
use tachyon_core::{RunState, SaveStateRequest, Session, SessionConfig, WorkerState};
use tachyon_utils::sync::{Arc, AtomicUsize, Ordering};

/// 222 MHz over the 59.94 Hz refresh.
const FRAME_CYCLES: u64 = 3_703_703;

mod fixture {
    use super::*;

    const ENTRY: u32 = 0x0880_4000;

    /// A minimal valid MIPS executable: one PT_LOAD at `ENTRY`.
    fn minimal_elf(payload: &[u8], bss: u32) -> Vec<u8> {
        let mut elf = vec![0u8; 0x54];
        elf[..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        elf[4] = 1; // 32-bit
        elf[5] = 1; // little-endian
        elf[6] = 1; // version
        elf[0x10..0x12].copy_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        elf[0x12..0x14].copy_from_slice(&8u16.to_le_bytes()); // EM_MIPS
        elf[0x18..0x1c].copy_from_slice(&ENTRY.to_le_bytes());
        elf[0x1c..0x20].copy_from_slice(&0x34u32.to_le_bytes()); // phoff
        elf[0x2a..0x2c].copy_from_slice(&32u16.to_le_bytes()); // phentsize
        elf[0x2c..0x2e].copy_from_slice(&1u16.to_le_bytes()); // phnum

        let filesz = payload.len() as u32;
        elf[0x34..0x38].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        elf[0x38..0x3c].copy_from_slice(&0x54u32.to_le_bytes()); // p_offset
        elf[0x3c..0x40].copy_from_slice(&ENTRY.to_le_bytes()); // p_vaddr
        elf[0x44..0x48].copy_from_slice(&filesz.to_le_bytes()); // p_filesz
        elf[0x48..0x4c].copy_from_slice(&(filesz + bss).to_le_bytes()); // p_memsz

        elf.extend_from_slice(payload);
        elf
    }

    pub fn write_elf(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tachyon-scheduler-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, minimal_elf(&[0x90; 64], 128)).unwrap();
        path
    }
}

fn threaded_config(path: &Path) -> SessionConfig {
    SessionConfig {
        enable_sound: false,
        remember_recent: false,
        suppress_frame_log: true,
        ..SessionConfig::for_program(path)
    }
}

#[test]
fn test_threaded_start_brings_up_worker_and_gpu() {
    let path = fixture::write_elf("boot.elf");
    let mut session = Session::new();

    assert!(session.start(threaded_config(&path)));
    // The controller only returns once the worker settled: idle or gone,
    // never mid-startup.
    assert_eq!(session.worker_state(), WorkerState::Running);
    assert!(session.is_initialized());
    assert!(session.gpu().is_initialized());
    assert_eq!(session.run_state(), RunState::Running);
    assert!(session.error_message().is_empty());

    session.stop();
    assert_eq!(session.worker_state(), WorkerState::NotRunning);
}

#[test]
fn test_threaded_start_with_missing_program_fails() {
    let mut session = Session::new();
    let ok = session.start(threaded_config(Path::new("/no/such/eboot.pbp")));

    assert!(!ok);
    assert!(!session.error_message().is_empty());
    assert!(!session.is_initialized());
    assert!(!session.gpu().is_initialized());
    // The worker aborted and fully exited.
    assert_eq!(session.worker_state(), WorkerState::NotRunning);

    // A failed start leaves nothing for stop to trip over.
    session.stop();
}

#[test]
fn test_threaded_advance_returns_with_worker_idle() {
    let path = fixture::write_elf("pace.elf");
    let mut session = Session::new();
    assert!(session.start(threaded_config(&path)));

    session.advance_to(100_000);
    assert_eq!(session.worker_state(), WorkerState::Running);
    assert!(session.current_tick() >= 100_000);
    // The pacer announced the frame to the GPU before dispatching.
    assert_eq!(session.gpu().frames_begun(), 1);

    session.stop();
}

#[test]
fn test_threaded_frame_boundary_hands_control_back() {
    let path = fixture::write_elf("frame.elf");
    let mut session = Session::new();
    assert!(session.start(threaded_config(&path)));

    // Ask for two frames; the vblank bounds the burst to one.
    session.advance_by(FRAME_CYCLES * 2);
    assert_eq!(session.run_state(), RunState::NextFrame);
    assert_eq!(session.current_tick(), FRAME_CYCLES);
    assert_eq!(session.worker_state(), WorkerState::Running);
    assert!(session.transition_pending());

    // Resume and finish the requested span.
    session.acknowledge_transition();
    session.set_run_state(RunState::Running);
    session.advance_to(FRAME_CYCLES * 2);
    assert_eq!(session.current_tick(), FRAME_CYCLES * 2);

    session.stop();
}

#[test]
fn test_stop_twice_is_safe_threaded() {
    let path = fixture::write_elf("stop.elf");
    let mut session = Session::new();
    assert!(session.start(threaded_config(&path)));

    session.stop();
    assert_eq!(session.worker_state(), WorkerState::NotRunning);
    assert!(!session.is_initialized());

    session.stop();
    assert_eq!(session.worker_state(), WorkerState::NotRunning);
}

#[test]
fn test_abrupt_stop_of_a_running_session_is_flagged() {
    let path = fixture::write_elf("abrupt.elf");
    let mut session = Session::new();
    assert!(session.start(threaded_config(&path)));
    assert_eq!(session.run_state(), RunState::Running);

    session.stop();
    // ERROR marks the shutdown as abrupt and survives the worker's
    // power-down path.
    assert_eq!(session.run_state(), RunState::Error);
}

#[test]
fn test_round_trip_restart_with_a_different_program() {
    let first = fixture::write_elf("first.elf");
    let second = fixture::write_elf("second.elf");
    let mut session = Session::new();

    assert!(session.start(threaded_config(&first)));
    session.advance_to(50_000);
    assert!(session.current_tick() >= 50_000);
    session.stop();
    // The abrupt stop raised the cancellation flag.
    assert!(session.transition_pending());

    assert!(session.start(threaded_config(&second)));
    assert!(session.is_initialized());
    // The stale flag did not follow the restart.
    assert!(!session.transition_pending());
    assert_eq!(session.config().program_path, second);
    // Fresh machine: the clock restarted from zero.
    assert!(session.current_tick() < 50_000);
    session.advance_to(10_000);
    assert!(session.current_tick() >= 10_000);
    session.stop();
}

#[test]
fn test_advance_after_stop_is_a_no_op() {
    let path = fixture::write_elf("late.elf");
    let mut session = Session::new();
    assert!(session.start(threaded_config(&path)));
    session.stop();

    let tick = session.current_tick();
    session.advance_by(100_000);
    assert_eq!(session.current_tick(), tick);
}

#[test]
fn test_savestate_requests_apply_between_frames() {
    let path = fixture::write_elf("state.elf");
    let mut session = Session::new();
    assert!(session.start(threaded_config(&path)));

    session.advance_to(50_000);
    session.savestate().request(SaveStateRequest::Snapshot);
    session.advance_by(0); // applies the snapshot, runs nothing new
    assert!(session.savestate().has_snapshot());

    session.advance_to(80_000);
    assert!(session.current_tick() >= 80_000);

    session.savestate().request(SaveStateRequest::Restore);
    // Absolute target: the restore rewinds below it, and the burst has
    // nothing left to run.
    session.advance_to(50_000);
    assert_eq!(session.current_tick(), 50_000);
    assert_eq!(session.savestate().last_error(), None);

    session.stop();
    // Teardown dropped the in-memory slot with the machine.
    assert!(!session.savestate().has_snapshot());
}

struct CountingAudioHost {
    inits: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl AudioHost for CountingAudioHost {
    fn init_sound(&self, _mixer: &StereoMixer) {
        self.inits.fetch_add(1, Ordering::Relaxed);
    }
    fn shutdown_sound(&self) {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_audio_host_sees_one_init_and_one_shutdown() {
    let path = fixture::write_elf("sound.elf");
    let host = Arc::new(CountingAudioHost {
        inits: AtomicUsize::new(0),
        shutdowns: AtomicUsize::new(0),
    });

    let mut session = Session::with_audio_host(host.clone());
    let config = SessionConfig {
        enable_sound: true,
        ..threaded_config(&path)
    };
    assert!(session.start(config));
    assert_eq!(host.inits.load(Ordering::Relaxed), 1);
    assert_eq!(host.shutdowns.load(Ordering::Relaxed), 0);

    session.stop();
    assert_eq!(host.inits.load(Ordering::Relaxed), 1);
    assert_eq!(host.shutdowns.load(Ordering::Relaxed), 1);
}

#[test]
fn test_failed_load_tears_audio_back_down() {
    // A disc image is identified fine but refuses to load, which exercises
    // the reverse-order teardown after the mixer came up.
    let dir = std::env::temp_dir().join(format!("tachyon-scheduler-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let iso = dir.join("refused.iso");
    fs::write(&iso, b"CD001").unwrap();

    let host = Arc::new(CountingAudioHost {
        inits: AtomicUsize::new(0),
        shutdowns: AtomicUsize::new(0),
    });
    let mut session = Session::with_audio_host(host.clone());
    let config = SessionConfig {
        enable_sound: true,
        ..threaded_config(&iso)
    };

    assert!(!session.start(config));
    assert!(session.error_message().contains("disc filesystem"));
    assert_eq!(host.inits.load(Ordering::Relaxed), 1);
    assert_eq!(host.shutdowns.load(Ordering::Relaxed), 1);
}
