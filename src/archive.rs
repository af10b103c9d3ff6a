//! Archive - one data directory with its catalog, ready to be queried
//!
//! Ties the pieces together: opening an archive opens (or creates) the
//! catalog inside the data directory, brings it up to date with the files on
//! disk and keeps the resulting file index and a cache of open files for
//! the queries that follow.
//!
//! ```rust,no_run
//! use stripdb::{Archive, ArchiveConfig, Channel, HkGroup};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut archive = Archive::open(&ArchiveConfig::for_dir("/data/strip"))?;
//!
//!     for tag in archive.tags(("2021-12-10", "2021-12-11"))? {
//!         println!("{} {}", tag.id, tag.name);
//!     }
//!
//!     let vd1 = Channel::housekeeping(HkGroup::Bias, "POL_R0", "VD1_HK");
//!     if let Some(series) = archive.load(("2021-12-10", "2021-12-11"), &vd1)? {
//!         println!("{} samples", series.len());
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use tracing::info;

use crate::config::ArchiveConfig;
use crate::index::{BuildReport, BuilderConfig, Catalog, CatalogBuilder, FileIndex};
use crate::query::{HandleCache, QueryResult, QueryWindow, SeriesQuery, TagQuery};
use crate::storage::{
    Channel, DataHandle, FileMetadataReader, FileRecord, RecordingReader, StorageResult,
    TagRecord, TimeSeries,
};

/// An open data directory
pub struct Archive {
    config: ArchiveConfig,
    catalog: Catalog,
    index: FileIndex,
    reader: Box<dyn FileMetadataReader>,
    cache: HandleCache,
    report: BuildReport,
}

impl Archive {
    /// Open the archive described by `config`, reading recording files
    pub fn open(config: &ArchiveConfig) -> StorageResult<Self> {
        let reader = RecordingReader::new(
            config.file_suffixes.clone(),
            config.earliest_acceptable_mjd,
        );
        Self::open_with_reader(config, Box::new(reader))
    }

    /// Open the archive with a custom file reader
    pub fn open_with_reader(
        config: &ArchiveConfig,
        reader: Box<dyn FileMetadataReader>,
    ) -> StorageResult<Self> {
        let data_dir = config.data_path();
        info!("Opening archive in {:?}", data_dir);

        let mut catalog = Catalog::open(&data_dir, &config.database_name)?
            .with_earliest(config.earliest_acceptable_mjd);
        let (index, report) = Self::sync(&mut catalog, reader.as_ref(), config)?;

        Ok(Self {
            config: config.clone(),
            catalog,
            index,
            reader,
            cache: HandleCache::new(config.max_open_files),
            report,
        })
    }

    fn sync(
        catalog: &mut Catalog,
        reader: &dyn FileMetadataReader,
        config: &ArchiveConfig,
    ) -> StorageResult<(FileIndex, BuildReport)> {
        CatalogBuilder::new(catalog, reader)
            .with_config(BuilderConfig {
                update_database: config.update_database,
            })
            .build(&config.data_path())
    }

    /// Rescan the data directory for new files
    pub fn refresh(&mut self) -> StorageResult<&BuildReport> {
        let (index, report) = Self::sync(&mut self.catalog, self.reader.as_ref(), &self.config)?;
        self.index = index;
        self.report = report;
        Ok(&self.report)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.data_path()
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// Outcome of the last catalog update
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// All indexed files, in time order
    pub fn files(&self) -> &[FileRecord] {
        self.index.files()
    }

    /// Files with data within `window`, in time order
    pub fn files_in_range(&self, window: impl QueryWindow) -> QueryResult<&[FileRecord]> {
        let range = window.window()?;
        Ok(self.index.records_in_range(&range))
    }

    /// Tags starting or ending within `window`
    pub fn tags(&self, window: impl QueryWindow) -> QueryResult<Vec<TagRecord>> {
        TagQuery::new(&self.catalog).in_range(window)
    }

    pub fn tag(&self, id: i64) -> QueryResult<Option<TagRecord>> {
        TagQuery::new(&self.catalog).by_id(id)
    }

    /// Samples of `channel` within `window`, across as many files as needed
    pub fn load(
        &mut self,
        window: impl QueryWindow,
        channel: &Channel,
    ) -> QueryResult<Option<TimeSeries>> {
        SeriesQuery::new(&self.index, self.reader.as_ref(), &mut self.cache).load(window, channel)
    }

    /// Like [`load`](Self::load), with a custom per-file loader
    pub fn load_with<F>(
        &mut self,
        window: impl QueryWindow,
        loader: F,
    ) -> QueryResult<Option<TimeSeries>>
    where
        F: FnMut(&mut dyn DataHandle) -> StorageResult<TimeSeries>,
    {
        SeriesQuery::new(&self.index, self.reader.as_ref(), &mut self.cache)
            .load_with(window, loader)
    }

    /// Close every open recording file; they are reopened on demand
    pub fn close_files(&mut self) {
        self.cache.clear();
    }

    /// Close the files and the catalog
    pub fn close(mut self) -> StorageResult<()> {
        self.cache.clear();
        self.catalog.close()
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("data_dir", &self.config.data_dir)
            .field("files", &self.index.len())
            .field("cache", &self.cache)
            .finish()
    }
}
