//! Error types for the prefilter engine
//!
//! All fatal conditions are represented here; the pipeline never retries.
//! I/O errors are wrapped transparently so `?` works throughout.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the prefilter engine
#[derive(Error, Debug)]
pub enum KmatchError {
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected masking mode is not implemented
    #[error("masking mode {0} is not supported")]
    UnsupportedMaskMode(u32),

    /// Even a single split arena cannot fit the memory budget after the
    /// sample count has been degraded to one k-mer per sequence
    #[error("memory budget of {budget} bytes cannot hold a split arena of {required} bytes")]
    MemoryBudgetExceeded {
        /// Bytes the smallest usable arena would need
        required: usize,
        /// Usable budget in bytes
        budget: usize,
    },

    /// More records were reserved than the arena was sized for
    #[error("record arena overflow: capacity {capacity}, attempted {attempted}")]
    ArenaOverflow {
        /// Arena capacity in records
        capacity: usize,
        /// Records the reservation would have required
        attempted: usize,
    },

    /// A spill file does not contain the number of entries that were written
    #[error("spill file {path:?} has {actual} bytes, expected {expected}")]
    SpillSizeMismatch {
        /// The offending file
        path: PathBuf,
        /// Expected size in bytes
        expected: usize,
        /// Observed size in bytes
        actual: usize,
    },

    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
