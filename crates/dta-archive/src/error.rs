//! Error types for the DTA archive crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or extracting DTA archives.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not mount the archive.
    #[error("failed to mount archive {path}: {reason}")]
    Mount { path: PathBuf, reason: String },

    /// The stream did not start with `ISD0`.
    #[error("invalid DTA magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    /// A file record declared a filename longer than allowed.
    #[error("filename length {length} exceeds the maximum of {max} bytes")]
    FilenameTooLong { length: usize, max: usize },

    /// A filename that cannot be turned into a path below the output directory.
    #[error("unsafe output path: {0:?}")]
    UnsafePath(String),

    /// Common library error (truncated decrypted structure).
    #[error("{0}")]
    Common(#[from] dta_common::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend returned fewer bytes than requested.
    #[error("short read: requested {requested} bytes, got {actual}")]
    ShortRead { requested: usize, actual: usize },

    /// The content table is larger than the configured ceiling.
    #[error("content table of {count} entries exceeds the limit of {limit}")]
    TableTooLarge { count: u64, limit: u64 },

    /// Memory for a table or buffer could not be reserved.
    #[error("failed to allocate {requested} bytes")]
    Allocation { requested: usize },

    /// A write-out asked for more bytes than the buffer holds.
    #[error("write of {requested} bytes exceeds buffer capacity of {capacity}")]
    BufferOverrun { requested: usize, capacity: usize },

    /// An entry named in the archive could not be opened.
    #[error("entry could not be opened: {0}")]
    FileOpen(String),

    /// Failure while processing a single content entry.
    #[error("entry {index} ({name}): {source}")]
    Entry {
        index: usize,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

/// Broad failure classes used for reporting and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Mount,
    Format,
    Io,
    Allocation,
    FileOpen,
}

impl Error {
    /// Innermost error, looking through entry wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Entry { source, .. } => source.root(),
            other => other,
        }
    }

    /// Failure class of the innermost error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Entry { source, .. } => source.category(),
            Error::Mount { .. } => ErrorCategory::Mount,
            Error::InvalidMagic { .. }
            | Error::FilenameTooLong { .. }
            | Error::UnsafePath(_)
            | Error::Common(_) => ErrorCategory::Format,
            Error::Io(_) | Error::ShortRead { .. } => ErrorCategory::Io,
            Error::TableTooLarge { .. }
            | Error::Allocation { .. }
            | Error::BufferOverrun { .. } => ErrorCategory::Allocation,
            Error::FileOpen(_) => ErrorCategory::FileOpen,
        }
    }

    pub(crate) fn in_entry(self, index: usize, name: impl Into<String>) -> Self {
        Error::Entry {
            index,
            name: name.into(),
            source: Box::new(self),
        }
    }
}

/// Result type for DTA operations.
pub type Result<T> = std::result::Result<T, Error>;
