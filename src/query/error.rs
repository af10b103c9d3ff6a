//! Query error types
//!
//! Defines all error conditions that can occur while querying the archive.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query window with start after end
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange { start: f64, end: f64 },

    /// Samples of two consecutive files are not in increasing time order
    #[error(
        "Data in {path:?} starts at {next}, which is not after the end of the previous file ({previous})"
    )]
    NonMonotonicArchive {
        path: PathBuf,
        previous: f64,
        next: f64,
    },

    /// A file spanned by the query does not contain the channel
    #[error("Channel {channel} not found in {path:?}")]
    ChannelNotFound { path: PathBuf, channel: String },

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidRange { start, end } => QueryError::InvalidRange { start, end },
            StorageError::ChannelNotFound { path, channel } => {
                QueryError::ChannelNotFound { path, channel }
            }
            other => QueryError::Storage(other),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
