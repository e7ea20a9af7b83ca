//! One emulation session: lifecycle controller, run-loop pacer, and the
//! execution worker body.
//!
//! A [`Session`] owns every piece of cross-thread state (run mode, worker
//! state machine, configuration, the machine itself) so independent sessions
//! can coexist and tests can construct their own. Two threads touch it: the
//! orchestrating thread calls [`start`](Session::start) /
//! [`stop`](Session::stop) / [`advance_to`](Session::advance_to), and the
//! execution worker runs [`worker_body`] when the separate-thread mode is
//! configured.
//!
//! There is no timeout on a worker stuck in EXECUTE: the guest-CPU run
//! primitive polls the run mode every quantum and is relied upon to return.
//! With an interpreter backend that guarantee moves to the backend.

use std::path::PathBuf;
use std::thread::JoinHandle;

use tachyon_utils::sync::{Arc, AtomicBool, AtomicU64, Mutex, MutexGuard, Ordering};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioHost, NullAudioHost, StereoMixer};
use crate::config::{RecentEntry, RecentFiles, SessionConfig};
use crate::cpu::CpuCore;
use crate::error::CoreError;
use crate::gpu::GpuContext;
use crate::kernel::Kernel;
use crate::loader::{self, ProgramInfo};
use crate::mem::{GuestMemory, RAM_BASE};
use crate::runstate::{RunState, RunStateCell};
use crate::savestate::SaveStateHub;
use crate::symbols::{self, SymbolMap};
use crate::timing::{TickCounter, TimedEventKind, Timing};
use crate::vfs::Vfs;
use crate::worker::{WorkerState, WorkerStateCell};

/// Guest stack top sits this far below the end of RAM.
const STACK_RESERVE: u32 = 0x100;

/// The live machine: everything bring-up constructs and teardown destroys.
/// Held behind one lock; the worker takes it for the duration of a burst,
/// the orchestrating thread only while the worker is idle.
struct Machine {
    cpu: CpuCore,
    mem: GuestMemory,
    timing: Timing,
    kernel: Kernel,
    vfs: Vfs,
    symbols: SymbolMap,
    info: ProgramInfo,
    sound_enabled: bool,
}

/// State shared between the orchestrating thread and the worker.
struct Shared {
    run: RunStateCell,
    worker: WorkerStateCell,
    config: Mutex<SessionConfig>,
    machine: Mutex<Option<Machine>>,
    ticks: Arc<TickCounter>,
    gpu: GpuContext,
    savestate: SaveStateHub,
    recent: Mutex<RecentFiles>,
    target_tick: AtomicU64,
    audio: Arc<dyn AudioHost>,
    initing: AtomicBool,
    inited: AtomicBool,
}

pub struct Session {
    shared: Arc<Shared>,
    worker_thread: Option<JoinHandle<()>>,
    threaded: bool,
}

impl Session {
    pub fn new() -> Self {
        Session::with_audio_host(Arc::new(NullAudioHost))
    }

    pub fn with_audio_host(audio: Arc<dyn AudioHost>) -> Self {
        Session {
            shared: Arc::new(Shared {
                run: RunStateCell::new(),
                worker: WorkerStateCell::new(),
                config: Mutex::new(SessionConfig::default()),
                machine: Mutex::new(None),
                ticks: Arc::new(TickCounter::new()),
                gpu: GpuContext::new(),
                savestate: SaveStateHub::new(),
                recent: Mutex::new(RecentFiles::default()),
                target_tick: AtomicU64::new(0),
                audio,
                initing: AtomicBool::new(false),
                inited: AtomicBool::new(false),
            }),
            worker_thread: None,
            threaded: false,
        }
    }

    /// Boot a program. Blocks until bring-up has either completed or failed;
    /// on failure the message is available through
    /// [`error_message`](Session::error_message).
    pub fn start(&mut self, config: SessionConfig) -> bool {
        if self.is_initing() || self.is_inited() {
            let err = CoreError::AlreadyStarted;
            error!("{err}");
            self.shared.config.lock().error_message = err.to_string();
            return false;
        }
        self.shared.initing.store(true, Ordering::Relaxed);
        self.threaded = config.separate_cpu_thread;
        {
            let mut live = self.shared.config.lock();
            *live = config;
            live.error_message.clear();
        }
        // The pending flag is scoped to one lifecycle; a cancellation raised
        // while the previous session stopped does not apply to this one.
        self.shared.run.clear_pending();

        if self.threaded {
            self.shared.worker.force(WorkerState::Pending);
            let shared = self.shared.clone();
            let spawned = std::thread::Builder::new()
                .name("tachyon-cpu".into())
                .spawn(move || worker_body(&shared));
            match spawned {
                Ok(handle) => {
                    self.worker_thread = Some(handle);
                    self.shared.worker.wait_until(WorkerState::is_ready);
                    if self.shared.worker.get() == WorkerState::NotRunning {
                        // Bring-up aborted; the thread is already done.
                        self.reap_worker();
                    }
                }
                Err(err) => {
                    error!("could not spawn execution worker: {err}");
                    self.shared.worker.force(WorkerState::NotRunning);
                    let mut live = self.shared.config.lock();
                    live.error_message = err.to_string();
                    live.program_path = PathBuf::new();
                }
            }
        } else {
            run_bring_up(&self.shared);
        }

        // A failed load clears the configured path; that is the success test.
        let ok = !self.shared.config.lock().program_path.as_os_str().is_empty();
        if ok {
            self.shared.gpu.init();
            self.shared.inited.store(true, Ordering::Relaxed);
            info!("session started, worker {:?}", self.shared.worker.get());
        }
        self.shared.initing.store(false, Ordering::Relaxed);
        ok
    }

    /// Shut the session down. Safe to call repeatedly; a second call finds
    /// nothing to stop.
    pub fn stop(&mut self) {
        if !self.is_inited() && self.worker_thread.is_none() {
            debug!("stop on a session that is not running");
            self.shared.gpu.shutdown();
            return;
        }
        // Mid-run shutdown is abrupt, not a clean power-off; observers see
        // the difference.
        if self.shared.run.get() == RunState::Running {
            self.shared.run.set(RunState::Error);
        }
        if self.worker_thread.is_some() {
            self.shared.worker.force(WorkerState::Shutdown);
            self.shared.worker.wait_until(WorkerState::is_shutdown);
            self.reap_worker();
        } else {
            if self.shared.run.get() != RunState::Error {
                self.shared.run.set(RunState::PowerDown);
            }
            teardown(&self.shared);
        }
        self.shared.gpu.shutdown();
        self.shared.inited.store(false, Ordering::Relaxed);
        info!("session stopped");
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                error!("execution worker panicked");
            }
        }
    }

    /// True while a guest CPU core is selected (bring-up succeeded and
    /// teardown has not run).
    pub fn is_initialized(&self) -> bool {
        self.shared.machine.lock().is_some()
    }

    pub fn is_initing(&self) -> bool {
        self.shared.initing.load(Ordering::Relaxed)
    }

    pub fn is_inited(&self) -> bool {
        self.shared.inited.load(Ordering::Relaxed)
    }

    /// Run the guest until the virtual clock reaches `target` ticks.
    ///
    /// Threaded mode hands the span to the worker and keeps the GPU event
    /// queue draining in bounded slices until the worker is idle again;
    /// inline mode runs the CPU on the calling thread. Either way, queued
    /// save-state requests are applied first, so a restore takes effect
    /// before any further instructions execute.
    pub fn advance_to(&mut self, target: u64) {
        self.process_save_requests();
        if matches!(
            self.shared.run.get(),
            RunState::PowerDown | RunState::Error
        ) {
            return;
        }
        if self.threaded {
            self.advance_threaded(target);
        } else {
            self.advance_inline(target);
        }
    }

    /// Run the guest for `cycles` more cycles.
    pub fn advance_by(&mut self, cycles: u64) {
        self.advance_to(self.shared.ticks.now().saturating_add(cycles));
    }

    fn process_save_requests(&self) {
        if !self.shared.savestate.has_pending() {
            return;
        }
        let mut machine = self.shared.machine.lock();
        if let Some(m) = machine.as_mut() {
            self.shared
                .savestate
                .process_pending(&mut m.cpu, &mut m.timing, m.mem.size());
        }
    }

    fn advance_threaded(&mut self, target: u64) {
        // The worker is idle here, so the machine lock is uncontended; the
        // slice uses the live clock rate, not the boot-time one.
        let (slice_cycles, quiet) = {
            let config = self.shared.config.lock();
            let machine = self.shared.machine.lock();
            let slice = machine
                .as_ref()
                .map_or(0, |m| m.timing.ms_to_cycles(u64::from(config.gpu_slice_ms)));
            (slice, config.suppress_frame_log)
        };
        self.shared.gpu.sync_begin_frame();
        self.shared.target_tick.store(target, Ordering::Relaxed);
        if !self
            .shared
            .worker
            .try_transition(WorkerState::Running, WorkerState::Execute)
        {
            error!(
                "cannot dispatch execution, worker is {:?}",
                self.shared.worker.get()
            );
            return;
        }
        // The worker may legitimately overshoot `target` (frame-skip style
        // bursts), so no hard wait here: drain GPU events a slice at a time
        // and re-check readiness between slices.
        while !self.shared.worker.ready() {
            let deadline = self.shared.ticks.now().saturating_add(slice_cycles);
            self.shared.gpu.run_events_until(&self.shared.ticks, deadline);
        }
        if !quiet {
            debug!("advanced to tick {}", self.shared.ticks.now());
        }
    }

    fn advance_inline(&mut self, target: u64) {
        let mut machine = self.shared.machine.lock();
        if let Some(m) = machine.as_mut() {
            m.cpu.run_until(&mut m.timing, &self.shared.run, target);
        }
    }

    /// Change the guest clock rate (the hardware ships at 222 MHz,
    /// overclockable to 333). Applies to future scheduling; call between
    /// advances.
    pub fn set_clock_mhz(&self, mhz: u32) {
        self.shared.config.lock().clock_mhz = mhz;
        if let Some(m) = self.shared.machine.lock().as_mut() {
            m.timing.set_clock_mhz(mhz);
        }
    }

    pub fn run_state(&self) -> RunState {
        self.shared.run.get()
    }

    pub fn set_run_state(&self, state: RunState) {
        self.shared.run.set(state);
    }

    pub fn transition_pending(&self) -> bool {
        self.shared.run.pending_transition()
    }

    pub fn acknowledge_transition(&self) -> bool {
        self.shared.run.acknowledge_transition()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.shared.worker.get()
    }

    pub fn current_tick(&self) -> u64 {
        self.shared.ticks.now()
    }

    /// The live configuration. Must not be written between `start` being
    /// called and bring-up settling.
    pub fn config(&self) -> MutexGuard<'_, SessionConfig> {
        self.shared.config.lock()
    }

    /// Message from the last failed bring-up, empty if none.
    pub fn error_message(&self) -> String {
        self.shared.config.lock().error_message.clone()
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.shared.gpu
    }

    pub fn savestate(&self) -> &SaveStateHub {
        &self.shared.savestate
    }

    pub fn recent_files(&self) -> Vec<RecentEntry> {
        self.shared.recent.lock().entries().to_vec()
    }

    /// Title from the loaded program's metadata, when it had any.
    pub fn program_title(&self) -> Option<String> {
        self.shared
            .machine
            .lock()
            .as_ref()
            .and_then(|m| m.info.title.clone())
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Entry point of the dedicated execution thread.
fn worker_body(shared: &Shared) {
    if !shared
        .worker
        .try_transition(WorkerState::Pending, WorkerState::Starting)
    {
        error!(
            "execution worker spawned in state {:?}, expected PENDING",
            shared.worker.get()
        );
        return;
    }

    if !run_bring_up(shared) {
        shared.worker.force(WorkerState::NotRunning);
        return;
    }
    shared
        .worker
        .try_transition(WorkerState::Starting, WorkerState::Running);

    while shared.worker.get() != WorkerState::Shutdown {
        shared.worker.wait_until(WorkerState::has_pending_action);
        match shared.worker.get() {
            WorkerState::Execute => {
                let target = shared.target_tick.load(Ordering::Relaxed);
                run_burst(shared, target);
                shared.gpu.finish_event_loop();
                shared
                    .worker
                    .try_transition(WorkerState::Execute, WorkerState::Running);
            }
            // A request was consumed between the wait and the dispatch, or
            // shutdown arrived; the loop condition sorts it out.
            WorkerState::Running | WorkerState::Shutdown => {}
            other => {
                error!("execution worker observed invalid state {other:?}");
                shared.worker.force(WorkerState::Shutdown);
            }
        }
    }

    // ERROR is sticky; a clean exit powers down.
    if shared.run.get() != RunState::Error {
        shared.run.set(RunState::PowerDown);
    }
    teardown(shared);
    shared.worker.force(WorkerState::NotRunning);
}

fn run_burst(shared: &Shared, target: u64) {
    let mut machine = shared.machine.lock();
    if let Some(m) = machine.as_mut() {
        m.cpu.run_until(&mut m.timing, &shared.run, target);
    } else {
        error!("execution dispatched without a machine");
    }
}

/// Bring-up plus failure bookkeeping: on error, record the message in the
/// config error slot and clear the program path (the caller's success test).
fn run_bring_up(shared: &Shared) -> bool {
    match bring_up(shared) {
        Ok(()) => true,
        Err(err) => {
            error!("bring-up failed: {err}");
            let mut config = shared.config.lock();
            config.error_message = err.to_string();
            config.program_path = PathBuf::new();
            false
        }
    }
}

/// One-time machine construction, in dependency order.
fn bring_up(shared: &Shared) -> Result<(), CoreError> {
    let config = shared.config.lock().clone();

    // Identification comes first: it decides the RAM size before guest
    // memory exists.
    let info = loader::inspect(&config.program_path)?;
    debug!(
        "identified {} as {} ({} MiB RAM)",
        config.program_path.display(),
        info.file_type,
        info.ram_size >> 20
    );

    let mut cpu = CpuCore::new();
    let mut mem = GuestMemory::new(info.ram_size);

    // Best-effort; running without symbols is normal.
    let map_path = symbols::map_path_for(&config.program_path);
    let symbol_map = match SymbolMap::load(&map_path) {
        Ok(map) => {
            info!("loaded {} symbols from {}", map.len(), map_path.display());
            map
        }
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("could not load symbol map {}: {err}", map_path.display());
            }
            SymbolMap::new()
        }
    };

    if config.enable_sound {
        shared.audio.init_sound(&StereoMixer::new());
    }

    let mut timing = Timing::new(config.clock_mhz, shared.ticks.clone());
    timing.schedule(TimedEventKind::VBlank, timing.cycles_per_frame());
    let mut kernel = Kernel::new();
    let mut vfs = Vfs::new();

    match loader::load(&config.program_path, &info, &mut mem, &mut vfs) {
        Ok(image) => {
            cpu.reset(image.entry, RAM_BASE + info.ram_size - STACK_RESERVE);
            info!(
                "loaded {} ({} bytes, entry {:08x})",
                config.program_path.display(),
                image.loaded_bytes,
                image.entry
            );
        }
        Err(err) => {
            // Reverse-order teardown of everything already up.
            vfs.shutdown();
            timing.shutdown();
            kernel.shutdown();
            if config.enable_sound {
                shared.audio.shutdown_sound();
            }
            mem.shutdown();
            return Err(err.into());
        }
    }

    if config.remember_recent {
        shared
            .recent
            .lock()
            .add(&config.program_path, info.title.as_deref());
    }

    *shared.machine.lock() = Some(Machine {
        cpu,
        mem,
        timing,
        kernel,
        vfs,
        symbols: symbol_map,
        info,
        sound_enabled: config.enable_sound,
    });
    shared.run.set(if config.start_paused {
        RunState::Stepping
    } else {
        RunState::Running
    });
    Ok(())
}

/// Ordered machine destruction; the exact reverse of bring-up.
fn teardown(shared: &Shared) {
    let Some(mut machine) = shared.machine.lock().take() else {
        return;
    };
    let config = shared.config.lock().clone();
    if config.auto_save_symbol_map && !machine.symbols.is_empty() {
        let map_path = symbols::map_path_for(&config.program_path);
        if let Err(err) = machine.symbols.save(&map_path) {
            warn!("could not save symbol map {}: {err}", map_path.display());
        }
    }
    machine.vfs.shutdown();
    machine.timing.shutdown();
    machine.kernel.shutdown();
    if machine.sound_enabled {
        shared.audio.shutdown_sound();
    }
    machine.mem.shutdown();
    shared.savestate.clear();
    debug!("machine torn down");
}
