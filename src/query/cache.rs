//! Open file handles shared across queries
//!
//! Opening a recording file means reading and checking its header and tags,
//! so handles are kept open and reused. The number of open handles is
//! bounded; when the bound is reached the least recently used handle is
//! closed. A closed file is simply opened again the next time it is needed.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::debug;

use crate::storage::{DataHandle, FileMetadataReader, StorageError, StorageResult};

/// Default bound on the number of open handles
pub const DEFAULT_MAX_OPEN_FILES: usize = 16;

/// LRU cache of open data handles, keyed by path
pub struct HandleCache {
    handles: LruCache<PathBuf, Box<dyn DataHandle>>,
    opens: usize,
}

impl HandleCache {
    /// Create a cache keeping at most `capacity` files open (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            handles: LruCache::new(capacity),
            opens: 0,
        }
    }

    /// Return the open handle for `path`, opening it with `reader` if needed
    pub fn get_or_open(
        &mut self,
        path: &Path,
        reader: &dyn FileMetadataReader,
    ) -> StorageResult<&mut dyn DataHandle> {
        if !self.handles.contains(path) {
            let handle = reader.open(path)?;
            self.opens += 1;

            if let Some((evicted, _)) = self.handles.push(path.to_path_buf(), handle) {
                debug!("Closed {:?} to make room for {:?}", evicted, path);
            }
        }

        match self.handles.get_mut(path) {
            Some(handle) => Ok(handle.as_mut()),
            None => Err(StorageError::InvalidFile(format!(
                "{:?} dropped from the handle cache while in use",
                path
            ))),
        }
    }

    /// Close the handle for `path`, if open
    pub fn close(&mut self, path: &Path) -> bool {
        self.handles.pop(path).is_some()
    }

    /// Close every handle
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.handles.contains(path)
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.handles.cap().get()
    }

    /// How many times a file has been opened by this cache
    pub fn opens(&self) -> usize {
        self.opens
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPEN_FILES)
    }
}

impl std::fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCache")
            .field("open", &self.handles.len())
            .field("capacity", &self.capacity())
            .field("opens", &self.opens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        Channel, CompressionType, HkGroup, RecordingReader, RecordingWriter, TimeSeries,
    };
    use tempfile::tempdir;

    fn write_files(dir: &Path, count: usize) -> Vec<PathBuf> {
        let channel = Channel::housekeeping(HkGroup::Bias, "POL_R0", "VD1_HK");
        (0..count)
            .map(|i| {
                let path = dir.join(format!("{i}.rec"));
                let t = 59000.0 + i as f64;
                let series = TimeSeries::new(vec![t, t + 0.5], vec![1.0, 2.0]).unwrap();
                RecordingWriter::new(CompressionType::None)
                    .channel(&channel, series)
                    .write(&path)
                    .unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_handles_are_reused() {
        let dir = tempdir().unwrap();
        let paths = write_files(dir.path(), 1);
        let reader = RecordingReader::default();
        let mut cache = HandleCache::new(4);

        let range = cache.get_or_open(&paths[0], &reader).unwrap().time_range();
        assert_eq!(range.start, 59000.0);
        cache.get_or_open(&paths[0], &reader).unwrap();

        assert_eq!(cache.opens(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let dir = tempdir().unwrap();
        let paths = write_files(dir.path(), 3);
        let reader = RecordingReader::default();
        let mut cache = HandleCache::new(2);

        cache.get_or_open(&paths[0], &reader).unwrap();
        cache.get_or_open(&paths[1], &reader).unwrap();
        // 0 becomes the most recently used
        cache.get_or_open(&paths[0], &reader).unwrap();
        cache.get_or_open(&paths[2], &reader).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&paths[0]));
        assert!(!cache.contains(&paths[1]));
        assert!(cache.contains(&paths[2]));
        assert_eq!(cache.opens(), 3);
    }

    #[test]
    fn test_reopen_after_close() {
        let dir = tempdir().unwrap();
        let paths = write_files(dir.path(), 1);
        let reader = RecordingReader::default();
        let mut cache = HandleCache::default();

        let before = cache.get_or_open(&paths[0], &reader).unwrap().time_range();
        assert!(cache.close(&paths[0]));
        assert!(!cache.close(&paths[0]));
        assert!(cache.is_empty());

        let after = cache.get_or_open(&paths[0], &reader).unwrap().time_range();
        assert_eq!(before, after);
        assert_eq!(cache.opens(), 2);
    }

    #[test]
    fn test_open_failure_is_not_cached() {
        let dir = tempdir().unwrap();
        let reader = RecordingReader::default();
        let mut cache = HandleCache::default();

        assert!(cache
            .get_or_open(&dir.path().join("missing.rec"), &reader)
            .is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.opens(), 0);
    }
}
