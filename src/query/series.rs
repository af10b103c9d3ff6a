//! Time-series loading across file boundaries
//!
//! # Pipeline
//!
//! ```text
//! window → FileIndex::span → for each file (in time order):
//!     open (or reuse) handle → load channel → clip to window
//!     → check it starts after what we already have → append
//! ```
//!
//! Samples must be strictly increasing across file boundaries. A file whose
//! data starts at or before the end of the previous one means a clock reset,
//! a duplicated file or a corrupted catalog, and is reported as
//! `NonMonotonicArchive` rather than reordered.

use tracing::{debug, warn};

use crate::index::FileIndex;
use crate::query::{HandleCache, QueryError, QueryResult, QueryWindow};
use crate::storage::{Channel, DataHandle, FileMetadataReader, StorageResult, TimeSeries};

/// Loads the samples of a channel over a time window
pub struct SeriesQuery<'a> {
    index: &'a FileIndex,
    reader: &'a dyn FileMetadataReader,
    cache: &'a mut HandleCache,
}

impl<'a> SeriesQuery<'a> {
    pub fn new(
        index: &'a FileIndex,
        reader: &'a dyn FileMetadataReader,
        cache: &'a mut HandleCache,
    ) -> Self {
        Self {
            index,
            reader,
            cache,
        }
    }

    /// Samples of `channel` within `window`
    ///
    /// Returns `None` when no file has data within the window.
    pub fn load(
        &mut self,
        window: impl QueryWindow,
        channel: &Channel,
    ) -> QueryResult<Option<TimeSeries>> {
        self.load_with(window, |handle| handle.load_channel(channel))
    }

    /// Like [`load`](Self::load), with a custom per-file loader
    ///
    /// `loader` receives each open file spanned by the window and returns
    /// all of its samples; clipping to the window is done here.
    pub fn load_with<F>(
        &mut self,
        window: impl QueryWindow,
        mut loader: F,
    ) -> QueryResult<Option<TimeSeries>>
    where
        F: FnMut(&mut dyn DataHandle) -> StorageResult<TimeSeries>,
    {
        let range = window.window()?;
        let records = self.index.records_in_range(&range);
        if records.is_empty() {
            debug!("No files with data within {}", range);
            return Ok(None);
        }

        let mut result: Option<TimeSeries> = None;
        for record in records {
            if !record.path.exists() {
                warn!(
                    "{:?} is in the catalog but missing from disk, skipping it",
                    record.path
                );
                continue;
            }

            let handle = self.cache.get_or_open(&record.path, self.reader)?;
            let series = loader(handle)?.clip(&range);

            let acc = result.get_or_insert_with(TimeSeries::default);
            if let (Some(previous), Some(next)) = (acc.last_time(), series.first_time()) {
                if next <= previous {
                    return Err(QueryError::NonMonotonicArchive {
                        path: record.path.clone(),
                        previous,
                        next,
                    });
                }
            }

            debug!("{} samples from {:?}", series.len(), record.path);
            acc.extend(series);
        }

        Ok(result)
    }
}
