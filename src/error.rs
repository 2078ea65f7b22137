//! Error types for the sort engine.
//!
//! Every fallible operation in this crate is a fatal condition: there is no
//! retry path once a read, a write, or an allocation fails mid-sort. Callers
//! that want resilience (retrying a flaky write, falling back to a smaller
//! buffer) must implement it above this crate.

use thiserror::Error;

/// Failure of the sort engine.
///
/// `Read` and `Write` distinguish which side of the scratch file failed,
/// matching the two I/O exit codes a caller is expected to report.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("read error at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("write error at offset {offset}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SortError {
    pub fn read(offset: u64, source: std::io::Error) -> Self {
        SortError::Read { offset, source }
    }

    pub fn write(offset: u64, source: std::io::Error) -> Self {
        SortError::Write { offset, source }
    }

    /// Numeric exit code, matching the fixed convention a caller can branch on
    /// without downcasting: 9 for a write failure, 10 for a read failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SortError::Write { .. } => 9,
            SortError::Read { .. } => 10,
            SortError::OutOfMemory(_) => 11,
            SortError::InvalidConfig(_) => 2,
        }
    }
}

pub type Result<T> = std::result::Result<T, SortError>;
