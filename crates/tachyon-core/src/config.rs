//! Per-session configuration.
//!
//! A [`SessionConfig`] is snapshotted by [`Session::start`] and read by the
//! execution worker during bring-up; it must not be written while bring-up is
//! in flight. The error message slot is the out-channel for bring-up
//! failures.
//!
//! [`Session::start`]: crate::session::Session::start

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path of the program to boot: an ELF, a PBP package, or a disc
    /// directory.
    pub program_path: PathBuf,
    /// Construct the audio mixer and hand it to the host.
    pub enable_sound: bool,
    /// Silence per-frame debug logging (frame pacing, event drains).
    pub suppress_frame_log: bool,
    /// Boot into STEPPING instead of RUNNING.
    pub start_paused: bool,
    /// Record the program in the recent-files list after a successful boot.
    pub remember_recent: bool,
    /// Run the execution worker on its own thread; otherwise all work happens
    /// inline on the caller's thread.
    pub separate_cpu_thread: bool,
    /// Write the symbol map back next to the program during teardown.
    pub auto_save_symbol_map: bool,
    /// Guest clock rate in MHz (the real hardware ships at 222, overclockable
    /// to 333).
    pub clock_mhz: u32,
    /// Virtual-time slice handed to the GPU event drain while the pacer waits
    /// for the worker, in milliseconds of guest time.
    pub gpu_slice_ms: u32,
    /// Last bring-up failure, empty if none. Written by the worker, read by
    /// `start` after the worker settles.
    pub error_message: String,
}

impl SessionConfig {
    pub fn for_program(path: impl Into<PathBuf>) -> Self {
        SessionConfig {
            program_path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            program_path: PathBuf::new(),
            enable_sound: true,
            suppress_frame_log: false,
            start_paused: false,
            remember_recent: true,
            separate_cpu_thread: true,
            auto_save_symbol_map: false,
            clock_mhz: 222,
            gpu_slice_ms: 100,
            error_message: String::new(),
        }
    }
}

/// Most-recent-first list of successfully booted programs.
#[derive(Debug)]
pub struct RecentFiles {
    entries: Vec<RecentEntry>,
    cap: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecentEntry {
    pub path: PathBuf,
    /// Title from the program's PARAM.SFO, when it had one.
    pub title: Option<String>,
}

impl RecentFiles {
    pub fn new(cap: usize) -> Self {
        RecentFiles {
            entries: Vec::new(),
            cap,
        }
    }

    pub fn add(&mut self, path: &Path, title: Option<&str>) {
        self.entries.retain(|e| e.path != path);
        self.entries.insert(
            0,
            RecentEntry {
                path: path.to_path_buf(),
                title: title.map(str::to_owned),
            },
        );
        self.entries.truncate(self.cap);
    }

    pub fn entries(&self) -> &[RecentEntry] {
        &self.entries
    }
}

impl Default for RecentFiles {
    fn default() -> Self {
        // Matches the front-end's menu depth.
        RecentFiles::new(30)
    }
}
