//! Archive Index Structures
//!
//! Keeps track of which recording files exist and what they cover:
//!
//! - **Catalog**: SQLite database of file records and tags, persisted
//!   next to the data so that files are opened only once
//! - **FileIndex**: In-memory, time-sorted list of file records with a
//!   binary-search locator
//! - **CatalogBuilder**: Walks the data directory and fills the catalog
//!
//! # Architecture
//!
//! ```text
//! Query: "VD1_HK of POL_R0 between 10:00 and 12:00"
//!        ↓
//! FileIndex: binary search → files [17, 18, 19]
//!        ↓
//! Open only those files, clip and concatenate
//! ```

mod builder;
mod catalog;
mod file_index;

pub use builder::{BuildReport, BuilderConfig, CatalogBuilder};
pub use catalog::{Catalog, CatalogBatch, DEFAULT_DATABASE_NAME};
pub use file_index::{locate, FileIndex};
