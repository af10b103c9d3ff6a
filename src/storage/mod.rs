//! Recording file storage
//!
//! This module provides everything that deals with single recording files:
//!
//! - **types**: Core data structures (TimeRange, FileRecord, TagRecord, TimeSeries)
//! - **channel**: Typed channel descriptors
//! - **reader**: The `FileMetadataReader`/`DataHandle` traits used by the catalog
//! - **recording**: The on-disk recording format and its reader
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use stripdb::storage::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = RecordingReader::default();
//!     let mut handle = reader.open(std::path::Path::new("/data/2021_12_10.rec.lz4"))?;
//!
//!     println!("File covers {}", handle.time_range());
//!     for tag in handle.tags() {
//!         println!("{}: {}", tag.id, tag.name);
//!     }
//!
//!     let channel = Channel::housekeeping(HkGroup::Bias, "POL_R0", "VD1_HK");
//!     let series = handle.load_channel(&channel)?;
//!     println!("{} samples", series.len());
//!
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod reader;
pub mod recording;
pub mod types;

// Re-export commonly used types
pub use channel::{Channel, DataType, Detector, HkGroup};
pub use error::{StorageError, StorageResult};
pub use reader::{has_suffix, DataHandle, FileMetadataReader};
pub use recording::{
    CompressionType, RecordingFile, RecordingHeader, RecordingReader, RecordingWriter,
    RECORDING_SUFFIXES,
};
pub use types::{
    datetime_from_mjd, extract_mean, mjd_from_datetime, parse_mjd, FileRecord, Mjd, TagRecord,
    TimeRange, TimeSeries, EARLIEST_ACCEPTABLE_MJD,
};
