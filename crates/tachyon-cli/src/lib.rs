//! # tachyon-cli
//!
//! Headless front end for the tachyon-rs emulator core: parses a run
//! configuration, boots a session, drives the frame loop for a bounded
//! number of frames, and maps the outcome to an exit code.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tachyon_core::{RunState, Session, SessionConfig};

/// One display frame's worth of cycles at the stock 222 MHz clock.
const DEFAULT_FRAME_CYCLES: u64 = 3_703_703;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A PSP-class handheld emulator execution core"
)]
pub struct Args {
    /// Program to boot: an ELF, a PBP package, or a disc directory.
    #[arg(value_name = "PROGRAM")]
    pub program: PathBuf,

    /// Boot paused instead of running.
    #[arg(long)]
    pub paused: bool,

    /// Do not construct the audio mixer.
    #[arg(long)]
    pub no_sound: bool,

    /// Run the guest CPU inline on this thread instead of a worker thread.
    #[arg(long)]
    pub inline_cpu: bool,

    /// Silence per-frame debug logging.
    #[arg(long)]
    pub suppress_frame_log: bool,

    /// Do not record the program in the recent-files list.
    #[arg(long)]
    pub no_recent: bool,

    /// Frames to run before stopping.
    #[arg(long, default_value_t = 60)]
    pub frames: u32,

    /// Cycles per frame advance.
    #[arg(long, default_value_t = DEFAULT_FRAME_CYCLES)]
    pub frame_cycles: u64,
}

impl Args {
    fn to_config(&self) -> SessionConfig {
        SessionConfig {
            program_path: self.program.clone(),
            enable_sound: !self.no_sound,
            suppress_frame_log: self.suppress_frame_log,
            start_paused: self.paused,
            remember_recent: !self.no_recent,
            separate_cpu_thread: !self.inline_cpu,
            ..SessionConfig::default()
        }
    }
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info`
/// level; repeat calls (tests) are harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Boot, run the frame loop, stop, and report.
pub fn run(args: &Args) -> ExitCode {
    let mut session = Session::new();
    if !session.start(args.to_config()) {
        let message = session.error_message();
        error!("failed to start {}: {message}", args.program.display());
        eprintln!("Error: {message}");
        return ExitCode::from(1);
    }
    if let Some(title) = session.program_title() {
        info!("booted \"{title}\"");
    }

    let mut frames_run = 0u32;
    while frames_run < args.frames {
        session.advance_by(args.frame_cycles);
        match session.run_state() {
            RunState::NextFrame => {
                // Frame presented; the pending flag raised at the frame
                // boundary is not a cancellation.
                session.acknowledge_transition();
                session.set_run_state(RunState::Running);
                frames_run += 1;
            }
            RunState::Running | RunState::Stepping => frames_run += 1,
            RunState::PowerDown | RunState::Error => break,
        }
    }

    let faulted = session.run_state() == RunState::Error;
    info!(
        "ran {frames_run} frame(s) to tick {}",
        session.current_tick()
    );
    session.stop();

    if faulted {
        eprintln!("Error: guest execution faulted");
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

pub fn run_cli() -> ExitCode {
    let args = Args::parse();
    run(&args)
}
