//! # tachyon-core
//!
//! The emulator core of tachyon-rs: a PSP-class handheld session built
//! around an execution scheduler. One [`Session`] owns the machine
//! (CPU shell, guest RAM, virtual clock, kernel registry, filesystem
//! mounts, GPU context, audio handle) and drives a dedicated execution
//! worker — or runs everything inline — through an explicit lifecycle
//! state machine, pacing guest execution against the orchestrating
//! thread's frame loop.

pub mod audio;
pub mod config;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod kernel;
pub mod loader;
pub mod mem;
pub mod runstate;
pub mod savestate;
pub mod session;
pub mod symbols;
pub mod timing;
pub mod vfs;
pub mod worker;

pub use config::{RecentEntry, SessionConfig};
pub use error::{CoreError, LoadError, MemoryError, SaveStateError};
pub use runstate::RunState;
pub use savestate::SaveStateRequest;
pub use session::Session;
pub use worker::WorkerState;
