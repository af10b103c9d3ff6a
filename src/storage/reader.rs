//! Per-file reader interface
//!
//! The catalog and the query engine never look inside recording files
//! directly: they go through a [`FileMetadataReader`], which opens a path and
//! hands back a [`DataHandle`]. Any file format can be plugged in by
//! implementing these two traits.

use std::path::Path;

use crate::storage::channel::Channel;
use crate::storage::error::StorageResult;
use crate::storage::types::{TagRecord, TimeRange, TimeSeries};

/// An open recording file
pub trait DataHandle {
    /// First and last sample recorded in the file
    fn time_range(&self) -> TimeRange;

    /// Tags found in the file, possibly incomplete if a tag was still open
    /// when the file was closed
    fn tags(&self) -> &[TagRecord];

    /// Load all the samples of a channel
    ///
    /// Fails with `StorageError::ChannelNotFound` if the file does not
    /// contain the channel.
    fn load_channel(&mut self, channel: &Channel) -> StorageResult<TimeSeries>;
}

/// Opens recording files
pub trait FileMetadataReader {
    /// Whether `path` looks like a file this reader understands
    fn accepts(&self, path: &Path) -> bool;

    /// Open a file and read its metadata
    fn open(&self, path: &Path) -> StorageResult<Box<dyn DataHandle>>;
}

/// Check if the file name of `path` ends with one of `suffixes`
pub fn has_suffix(path: &Path, suffixes: &[String]) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())))
        .unwrap_or(false)
}
