//! Error types for blocktree.
//!
//! Every public operation returns [`Result`]. The variants mirror the
//! distinct outcomes callers are expected to branch on: a missing key is not
//! a duplicate key is not an exhausted free list, and corruption is fatal
//! where the others are routine. I/O failures from the block store are
//! wrapped rather than flattened so the underlying `std::io::Error` stays
//! inspectable.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("free list exhausted, no block available")]
    NoSpace,

    #[error("key not found")]
    NotFound,

    #[error("key already present")]
    Conflict,

    #[error("keys out of order")]
    OutOfOrder,

    #[error("wrong width: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("corruption detected: {0}")]
    Corrupt(String),

    #[error("unsupported operation: {0}")]
    Unimplemented(&'static str),
}

impl Error {
    /// True for errors that indicate a damaged on-disk structure rather
    /// than a routine outcome of the requested operation.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }
}
