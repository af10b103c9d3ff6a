//! File Index - time-sorted view of the catalogued files
//!
//! Recordings are sequential: two files never cover the same instant, but
//! there may be gaps between consecutive files. The index keeps the files
//! sorted by their first sample and finds the files covering a time window
//! with a binary search.
//!
//! ```text
//!   a        b        c                       d
//! [0,1]  [1.1,2]  [2.1,5]    (gap)        [8.1,9]
//!
//! span([0.2, 1.8]) → a, b
//! span([6.0, 7.0]) → nothing (inside the gap)
//! ```

use std::ops::Range;

use crate::index::Catalog;
use crate::storage::{FileRecord, Mjd, StorageResult, TimeRange};

/// Find the file containing `t` within `files[lo..=hi]`
///
/// Returns the index of the file whose range contains `t`; if `t` falls in a
/// gap or beyond either end, returns the index of a file next to it. Callers
/// must check whether the returned file really overlaps what they need.
///
/// `files` must be sorted by start time and `hi < files.len()`.
pub fn locate(files: &[FileRecord], t: Mjd, lo: usize, hi: usize) -> usize {
    let mut lo = lo as isize;
    let mut hi = hi as isize;

    while lo < hi {
        let mid = (lo + hi) / 2;
        let range = &files[mid as usize].time_range;

        if range.contains(t) {
            return mid as usize;
        } else if t <= range.start {
            hi = mid - 1;
        } else {
            lo = mid + 1;
        }
    }

    lo.min(hi).max(0) as usize
}

/// Immutable, time-sorted list of file records
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: Vec<FileRecord>,
}

impl FileIndex {
    /// Build an index from records in any order
    pub fn new(mut files: Vec<FileRecord>) -> Self {
        files.sort_by(|a, b| a.start().total_cmp(&b.start()));
        Self { files }
    }

    /// Build an index from every file with a valid range in `catalog`
    pub fn from_catalog(catalog: &Catalog) -> StorageResult<Self> {
        let earliest = catalog.earliest();
        let files = catalog
            .files_by_start()?
            .into_iter()
            .filter(|record| record.time_range.is_after(earliest))
            .collect();
        Ok(Self::new(files))
    }

    /// All files, sorted by start time
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn get(&self, idx: usize) -> Option<&FileRecord> {
        self.files.get(idx)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Index of the file containing `t`, or of the nearest file
    pub fn locate(&self, t: Mjd) -> Option<usize> {
        if self.files.is_empty() {
            None
        } else {
            Some(locate(&self.files, t, 0, self.files.len() - 1))
        }
    }

    /// Indices of the files with data within `[t0, t1]`
    ///
    /// Fails with `InvalidRange` if `t0 > t1`.
    pub fn files_in_range(&self, t0: Mjd, t1: Mjd) -> StorageResult<Range<usize>> {
        Ok(self.span(&TimeRange::new(t0, t1)?))
    }

    /// Indices of the files whose range intersects `range`
    ///
    /// The result is empty when `range` lies within a gap, before the first
    /// file or after the last one.
    pub fn span(&self, range: &TimeRange) -> Range<usize> {
        let (Some(first), Some(last)) = (self.locate(range.start), self.locate(range.end)) else {
            return 0..0;
        };

        let files = &self.files;
        let mut first = first;
        let mut last = last.max(first);

        // The locator may stop on the file just before or after a gap
        while first < last && files[first].end() < range.start {
            first += 1;
        }
        while last > first && files[last].start() > range.end {
            last -= 1;
        }

        if !files[first].time_range.overlaps(range) {
            tracing::debug!("No file overlaps {}", range);
            return first..first;
        }

        first..last + 1
    }

    /// Records of the files whose range intersects `range`
    pub fn records_in_range(&self, range: &TimeRange) -> &[FileRecord] {
        &self.files[self.span(range)]
    }

    /// From the first sample of the first file to the last of the last one
    pub fn time_span(&self) -> Option<TimeRange> {
        match (self.files.first(), self.files.last()) {
            (Some(first), Some(last)) => Some(TimeRange {
                start: first.start(),
                end: last.end(),
            }),
            _ => None,
        }
    }
}
