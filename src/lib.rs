//! # stripdb
//!
//! Time-indexed catalog and query engine for archives of instrument
//! recording files.
//!
//! An archive is a directory of sequential recording files, each covering a
//! stretch of time and holding many channels (science outputs and
//! housekeeping parameters) plus the tags marking experiment phases. stripdb
//! keeps a SQLite catalog next to the files so that each file is opened only
//! once, finds the files covering a time window with a binary search, and
//! stitches the samples of a channel into one series across file
//! boundaries.
//!
//! ## Modules
//!
//! - [`storage`]: Recording files, timestamps, channels and the reader traits
//! - [`index`]: The catalog, its builder and the time-sorted file index
//! - [`query`]: Tag and time-series queries
//! - [`archive`]: One data directory, ready to be queried
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stripdb::{Archive, ArchiveConfig, Channel, DataType, Detector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut archive = Archive::open(&ArchiveConfig::for_dir("/data/strip"))?;
//!     println!("{}", archive.report());
//!
//!     let window = ("2021-12-10 10:00:00", "2021-12-10 12:00:00");
//!     for tag in archive.tags(window)? {
//!         println!("{:>6} {}", tag.id, tag.name);
//!     }
//!
//!     let q1 = Channel::science("R0", DataType::Dem, Detector::Q1);
//!     match archive.load(window, &q1)? {
//!         Some(series) => println!("Loaded {} samples", series.len()),
//!         None => println!("No data yet"),
//!     }
//!
//!     archive.close()?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod index;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use archive::Archive;

pub use config::{generate_default_config, ArchiveConfig, Config, ConfigError, LoggingConfig};

pub use index::{BuildReport, BuilderConfig, Catalog, CatalogBuilder, FileIndex};

pub use query::{HandleCache, QueryError, QueryResult, QueryWindow, SeriesQuery, TagQuery};

pub use storage::{
    extract_mean, parse_mjd, Channel, DataHandle, DataType, Detector, FileMetadataReader,
    FileRecord, HkGroup, Mjd, RecordingReader, StorageError, StorageResult, TagRecord, TimeRange,
    TimeSeries,
};
