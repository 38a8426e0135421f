//! Error types for sstfile.

use std::io;
use thiserror::Error;

/// The result type used throughout sstfile.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for table operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The table has been finalized and can no longer be modified.
    #[error("Table is immutable (already finalized)")]
    ImmutableTable,

    /// An operation was attempted in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The file header was already written by this editor.
    #[error("Header already written")]
    HeaderAlreadyWritten,

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The stored checksum value.
        expected: u32,
        /// The recomputed checksum value.
        actual: u32,
    },

    /// The target file already exists and is not empty.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The table was finalized and can't be reopened for appending.
    #[error("Already finalized: {0}")]
    AlreadyFinalized(String),

    /// The requested item was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A body offset outside of the row region was requested.
    #[error("Body offset {offset} out of bounds (body size {body_size})")]
    IndexOutOfBounds {
        /// The requested body offset.
        offset: u64,
        /// The body size at the time of the request.
        body_size: u64,
    },

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Returns true if this error indicates a damaged file.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bad magic");
        assert_eq!(err.to_string(), "Data corruption: bad magic");

        let err = Error::ChecksumMismatch { expected: 0x12345678, actual: 0x87654321 };
        assert!(err.to_string().contains("0x12345678"));
        assert!(err.to_string().contains("0x87654321"));

        let err = Error::IndexOutOfBounds { offset: 40, body_size: 32 };
        assert_eq!(err.to_string(), "Body offset 40 out of bounds (body size 32)");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_is_corruption() {
        assert!(Error::corruption("x").is_corruption());
        assert!(Error::ChecksumMismatch { expected: 1, actual: 2 }.is_corruption());
        assert!(!Error::ImmutableTable.is_corruption());
    }
}
