use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Program loading failed: {0}")]
    Load(#[from] LoadError),

    #[error("Memory access violation: {0}")]
    Memory(#[from] MemoryError),

    #[error("Save state failed: {0}")]
    SaveState(#[from] SaveStateError),

    #[error("A session is already initializing or initialized")]
    AlreadyStarted,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unrecognized format: {0}")]
    UnrecognizedFormat(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Executable does not fit in guest memory: {0}")]
    DoesNotFit(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemoryError {
    #[error("Access violation at {address:08x} (+{len})")]
    AccessViolation { address: u32, len: usize },

    #[error("Memory not initialized")]
    NotInitialized,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SaveStateError {
    #[error("No snapshot to restore")]
    Empty,

    #[error("Machine not available")]
    Unavailable,
}
