use std::io;
use std::time::SystemTimeError;
use thiserror::Error;

/// Engine-level failures: storage I/O, on-disk format, locking.
#[derive(Error, Debug)]
pub enum LsmError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("system clock error: {0}")]
    Time(#[from] SystemTimeError),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("invalid SSTable format: {0}")]
    InvalidSstable(String),

    #[error("invalid memtable size: {0}")]
    InvalidMemtableSize(String),

    #[error("invalid worker pool size: {0}")]
    InvalidPoolSize(String),

    #[error("invalid replica timeout: {0}")]
    InvalidTimeout(String),

    #[error("compaction failed: {0}")]
    CompactionFailed(String),
}

pub type Result<T> = std::result::Result<T, LsmError>;

/// Coordinator/HTTP-boundary failures, each carrying its own status mapping.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("Not Enough Replicas")]
    QuorumUnreachable,

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl DispatchError {
    /// HTTP status code this error maps to at the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::BadRequest(_) => 400,
            DispatchError::NotFound => 404,
            DispatchError::Unavailable(_) => 503,
            DispatchError::QuorumUnreachable => 504,
        }
    }
}

impl From<LsmError> for DispatchError {
    fn from(err: LsmError) -> Self {
        DispatchError::Unavailable(err.to_string())
    }
}
