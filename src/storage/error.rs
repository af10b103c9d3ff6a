//! Storage error types
//!
//! Defines all errors that can occur while reading recording files and
//! maintaining the catalog.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the storage and catalog layers
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog database operation failed
    #[error("Catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Recording file does not follow the expected format
    #[error("Invalid recording file: {0}")]
    InvalidFile(String),

    /// No reader knows how to open this file
    #[error("Unsupported file {0:?}")]
    UnsupportedFile(PathBuf),

    /// A date string could not be converted into a timestamp
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Time range with start after end
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange { start: f64, end: f64 },

    /// A file was rescanned and its time range disagrees with the catalog
    #[error(
        "File {path:?} is already catalogued with range {recorded:?}, but a new scan reports {scanned:?}"
    )]
    DuplicatePath {
        path: PathBuf,
        recorded: (f64, f64),
        scanned: (f64, f64),
    },

    /// Requested channel does not exist in a file
    #[error("Channel {channel} not found in {path:?}")]
    ChannelNotFound { path: PathBuf, channel: String },
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
