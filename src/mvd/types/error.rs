//! Custom error types for the mvd-reader crate.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum MvdError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The file matched none of the known circuit layouts.
    #[error("Unrecognized circuit file format: {}", .0.display())]
    UnrecognizedFormat(PathBuf),

    /// The requested population is not part of the SONATA file.
    #[error("Population '{population}' not found, available: {available:?}")]
    PopulationNotFound {
        population: String,
        available: Vec<String>,
    },

    /// No population was requested and the file holds several without a `default` one.
    #[error("Multiple populations found ({0:?}), select one explicitly")]
    AmbiguousPopulation(Vec<String>),

    /// A named or optional attribute is absent from this file.
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// A selector referenced a cell outside `[0, len)`.
    #[error("Index {index} out of range for {len} cells")]
    IndexOutOfRange { index: usize, len: usize },

    /// A cell's combo key has no row in the bound side table.
    #[error("Combo key '{0}' not found in side table")]
    UnresolvedComboKey(String),

    /// A side table row could not be parsed.
    #[error("Malformed side table at line {line}: {reason}")]
    MalformedSideTable { line: usize, reason: String },

    /// Index access was requested on an attribute that has no library.
    #[error("Attribute '{0}' is not an enumerated attribute")]
    NotEnumerated(String),

    /// The attribute exists but its stored type cannot serve this accessor.
    #[error("Attribute '{name}' cannot be read as {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// The container file version is unsupported.
    #[error("Unsupported container version: {0}. Only version 1 is supported.")]
    UnsupportedVersion(u32),

    /// A checksum validation failed, indicating data corruption.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The file is structurally invalid.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// A mutex lock was poisoned, indicating a panic in another thread holding the lock.
    #[error("A mutex lock was poisoned, indicating a panic in another thread holding the lock.")]
    LockPoisoned,
}

/// A convenience `Result` type alias using the crate's `MvdError` type.
pub type Result<T> = std::result::Result<T, MvdError>;
