//! Catalog Builder - keeps the catalog in sync with the files on disk
//!
//! ```text
//! walk data dir → for each recording file:
//!     catalogued with a valid range?  → reuse, do not open
//!     otherwise                       → open, read range + tags,
//!                                       write file + tags in one transaction
//! → FileIndex (all records sorted by first sample)
//! ```
//!
//! A file that cannot be read is logged and skipped: one broken file must
//! not make the rest of the archive unusable.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::index::{Catalog, FileIndex};
use crate::storage::{FileMetadataReader, FileRecord, StorageResult, TagRecord};

/// Configuration for the catalog builder
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Open and catalogue new files; when false only report them
    pub update_database: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            update_database: true,
        }
    }
}

/// Outcome of one catalog build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Recording files found on disk
    pub scanned: usize,
    /// Files already catalogued, not opened
    pub reused: usize,
    /// Files opened and added to the catalog
    pub indexed: usize,
    /// Files that could not be read
    pub skipped: usize,
    /// Files not catalogued because updates are disabled
    pub unindexed: usize,
    /// Catalogued files no longer present on disk
    pub stale: usize,
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files scanned, {} reused, {} indexed, {} skipped, {} not indexed, {} stale",
            self.scanned, self.reused, self.indexed, self.skipped, self.unindexed, self.stale
        )
    }
}

/// Synchronises a catalog with a data directory
pub struct CatalogBuilder<'a> {
    catalog: &'a mut Catalog,
    reader: &'a dyn FileMetadataReader,
    config: BuilderConfig,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(catalog: &'a mut Catalog, reader: &'a dyn FileMetadataReader) -> Self {
        Self {
            catalog,
            reader,
            config: BuilderConfig::default(),
        }
    }

    /// Builder method: set the configuration
    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    /// Find every recording file under `root`, as canonical paths
    ///
    /// Symlinks are followed; the same file reached through different links
    /// is listed once.
    pub fn scan(&self, root: &Path) -> Vec<PathBuf> {
        let mut found = BTreeSet::new();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot walk {:?}: {}", root, e);
                    continue;
                }
            };

            if entry.file_type().is_dir() || !self.reader.accepts(entry.path()) {
                continue;
            }

            match entry.path().canonicalize() {
                Ok(path) => {
                    found.insert(path);
                }
                Err(e) => warn!("Cannot resolve {:?}: {}", entry.path(), e),
            }
        }

        found.into_iter().collect()
    }

    /// Bring the catalog up to date with `root` and return the file index
    pub fn build(mut self, root: &Path) -> StorageResult<(FileIndex, BuildReport)> {
        let mut report = BuildReport::default();
        let earliest = self.catalog.earliest();

        let candidates = self.scan(root);
        info!("{} files match in {:?}", candidates.len(), root);

        for path in &candidates {
            report.scanned += 1;

            if let Some(record) = self.catalog.file_record(path)? {
                if record.time_range.is_after(earliest) {
                    debug!("{:?} already catalogued", path);
                    report.reused += 1;
                    continue;
                }
            }

            if !self.config.update_database {
                warn!(
                    "File {:?} is not in the catalog or has a wrong time range, \
                     enable database updates to index it",
                    path
                );
                report.unindexed += 1;
                continue;
            }

            info!("File {:?} not found in the catalog, adding its metadata", path);
            let (record, tags) = match self.read_metadata(path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    error!("Unable to read metadata from {:?}: {}", path, e);
                    report.skipped += 1;
                    continue;
                }
            };

            if !record.time_range.is_after(earliest) {
                error!(
                    "File {:?} has no valid time range ({}), skipping it",
                    path, record.time_range
                );
                report.skipped += 1;
                continue;
            }

            let batch = self.catalog.begin_batch()?;
            batch.upsert_file(&record)?;
            for tag in &tags {
                batch.upsert_tag(tag)?;
            }
            batch.commit()?;
            report.indexed += 1;
        }

        // Entries are kept even if their file has gone
        let on_disk: BTreeSet<&PathBuf> = candidates.iter().collect();
        for record in self.catalog.files_by_start()? {
            if !on_disk.contains(&record.path) {
                warn!(
                    "{:?} is present in the catalog but is missing from disk",
                    record.path
                );
                report.stale += 1;
            }
        }

        let index = FileIndex::from_catalog(self.catalog)?;
        info!("Catalog updated: {}", report);
        Ok((index, report))
    }

    /// Open a file and read what the catalog needs; the handle is closed
    /// before returning
    fn read_metadata(&self, path: &Path) -> StorageResult<(FileRecord, Vec<TagRecord>)> {
        let size_bytes = std::fs::metadata(path)?.len();
        let handle = self.reader.open(path)?;
        let record = FileRecord::new(path, size_bytes, handle.time_range());
        let tags = handle.tags().to_vec();
        Ok((record, tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        Channel, CompressionType, HkGroup, RecordingReader, RecordingWriter, TimeSeries,
    };
    use crate::storage::{DataHandle, TimeRange};
    use std::cell::Cell;
    use tempfile::tempdir;

    /// Counts how many files are opened
    struct CountingReader {
        inner: RecordingReader,
        opens: Cell<usize>,
    }

    impl CountingReader {
        fn new() -> Self {
            Self {
                inner: RecordingReader::default(),
                opens: Cell::new(0),
            }
        }
    }

    impl FileMetadataReader for CountingReader {
        fn accepts(&self, path: &Path) -> bool {
            self.inner.accepts(path)
        }

        fn open(&self, path: &Path) -> StorageResult<Box<dyn DataHandle>> {
            self.opens.set(self.opens.get() + 1);
            self.inner.open(path)
        }
    }

    fn hk() -> Channel {
        Channel::housekeeping(HkGroup::Bias, "POL_R0", "VD1_HK")
    }

    fn write_file(path: &Path, start: f64, end: f64, tags: Vec<TagRecord>) {
        let series = TimeSeries::new(vec![start, (start + end) / 2.0, end], vec![1.0, 2.0, 3.0])
            .unwrap();
        let mut writer = RecordingWriter::new(CompressionType::Lz4).channel(&hk(), series);
        for tag in tags {
            writer = writer.tag(tag);
        }
        writer.write(path).unwrap();
    }

    #[test]
    fn test_build_is_incremental() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("a.rec.lz4"), 59000.0, 59000.5, vec![]);
        write_file(&dir.path().join("sub/b.rec.lz4"), 59001.0, 59001.5, vec![]);

        let reader = CountingReader::new();
        let mut catalog = Catalog::open(dir.path(), "index.db").unwrap();

        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(report.indexed, 2);
        assert_eq!(reader.opens.get(), 2);

        let before = catalog.files_by_start().unwrap();
        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(report.reused, 2);
        assert_eq!(report.indexed, 0);
        assert_eq!(reader.opens.get(), 2, "second build must not open any file");
        assert_eq!(catalog.files_by_start().unwrap(), before);
    }

    #[test]
    fn test_new_files_are_added() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("a.rec"), 59000.0, 59000.5, vec![]);

        let reader = CountingReader::new();
        let mut catalog = Catalog::open_in_memory().unwrap();
        CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        write_file(&dir.path().join("b.rec"), 59001.0, 59001.5, vec![]);
        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        assert_eq!(report.reused, 1);
        assert_eq!(report.indexed, 1);
        assert_eq!(reader.opens.get(), 2);
        assert_eq!(index.files()[1].start(), 59001.0);
    }

    #[test]
    fn test_broken_file_is_skipped() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("a.rec"), 59000.0, 59000.5, vec![]);
        std::fs::write(dir.path().join("broken.rec"), b"not a recording").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let reader = RecordingReader::default();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_tags_spanning_two_files() {
        let dir = tempdir().unwrap();
        write_file(
            &dir.path().join("a.rec"),
            59000.0,
            59000.5,
            vec![TagRecord::new(7, "TURNON", 59000.4, -1.0).comments("go", "")],
        );
        write_file(
            &dir.path().join("b.rec"),
            59000.6,
            59001.0,
            vec![TagRecord::new(7, "TURNON", 59000.4, 59000.7).comments("go", "done")],
        );

        let reader = RecordingReader::default();
        let mut catalog = Catalog::open_in_memory().unwrap();
        CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        assert_eq!(catalog.tag_count().unwrap(), 1);
        let tag = catalog.tag_by_id(7).unwrap().unwrap();
        assert_eq!(tag.end, 59000.7);
        assert_eq!(tag.end_comment, "done");
    }

    #[test]
    fn test_read_only_build_does_not_open() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join("a.rec"), 59000.0, 59000.5, vec![]);

        let reader = CountingReader::new();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .with_config(BuilderConfig {
                update_database: false,
            })
            .build(dir.path())
            .unwrap();

        assert!(index.is_empty());
        assert_eq!(report.unindexed, 1);
        assert_eq!(reader.opens.get(), 0);
    }

    #[test]
    fn test_missing_file_is_stale_not_deleted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.rec");
        write_file(&path, 59000.0, 59000.5, vec![]);

        let reader = RecordingReader::default();
        let mut catalog = Catalog::open_in_memory().unwrap();
        CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        assert_eq!(report.stale, 1);
        assert_eq!(catalog.file_count().unwrap(), 1);
        assert_eq!(index.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_resolved() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data");
        write_file(&data.join("a.rec"), 59000.0, 59000.5, vec![]);
        std::os::unix::fs::symlink(data.join("a.rec"), dir.path().join("link.rec")).unwrap();

        let reader = RecordingReader::default();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let (index, report) = CatalogBuilder::new(&mut catalog, &reader)
            .build(dir.path())
            .unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.files()[0].time_range,
            TimeRange::new(59000.0, 59000.5).unwrap()
        );
    }
}
