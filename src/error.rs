use std::path::PathBuf;

use thiserror::Error;

use crate::digest::DigestAlgorithm;

/// Status reported for a digest that completed successfully.
pub const STATUS_OK: u32 = 0;

/// Status reported for any failure inside the read/hash loop.
pub const STATUS_IO_FAILURE: u32 = 0x17;

/// Known errors for digest operations.
#[derive(Debug, Error)]
pub enum DigestError {
    /// The file to digest does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be opened for reading
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// The path exists but is not a regular file
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// Any other failure while opening the file
    #[error("Failed to open {}: {}", .path.display(), .source)]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a chunk failed, or the stream ended before its declared length
    #[error("Read failure: {0}")]
    ReadFailure(#[source] std::io::Error),

    /// A per-chunk worker thread panicked before reaching the barrier
    #[error("The {0} worker panicked")]
    WorkerPanicked(String),

    #[error("{algorithm} produced {actual} digest bytes, expected {expected}")]
    DigestLength {
        algorithm: DigestAlgorithm,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid chunk size {0}, must be greater than 0")]
    InvalidChunkSize(usize),
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl DigestError {
    /// Maps the error onto the numeric status consumed by cataloguing tools.
    ///
    /// Open failures keep a distinct code per cause, everything that happens
    /// after the stream is open collapses to [`STATUS_IO_FAILURE`].
    pub fn status_code(&self) -> u32 {
        match self {
            DigestError::NotFound(_) => 0x02,
            DigestError::NotAFile(_) => 0x03,
            DigestError::PermissionDenied(_) => 0x05,
            DigestError::OpenFailed { .. } => 0x16,
            DigestError::InvalidChunkSize(_) => 0x57,
            DigestError::ReadFailure(_)
            | DigestError::WorkerPanicked(_)
            | DigestError::DigestLength { .. } => STATUS_IO_FAILURE,
        }
    }

    /// Returns true when the failure happened before any byte was hashed.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            DigestError::NotFound(_)
                | DigestError::NotAFile(_)
                | DigestError::PermissionDenied(_)
                | DigestError::OpenFailed { .. }
        )
    }
}
