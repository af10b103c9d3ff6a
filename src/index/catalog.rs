//! Catalog - SQLite-backed inventory of recording files and tags
//!
//! One catalog lives next to the recording files it describes (by default
//! `index.db` in the data directory). It holds two tables:
//!
//! - `files`: one row per recording file, keyed by its canonical path
//! - `tags`: one row per tag, keyed by the id assigned by the control software
//!
//! Once a file has been catalogued it is never opened again by the builder,
//! and tag queries never touch the recording files at all.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use std::path::{Path, PathBuf};

use crate::storage::{
    FileRecord, Mjd, StorageError, StorageResult, TagRecord, TimeRange, EARLIEST_ACCEPTABLE_MJD,
};

/// Default name of the catalog file inside a data directory
pub const DEFAULT_DATABASE_NAME: &str = "index.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        size_in_bytes INTEGER NOT NULL,
        first_sample REAL NOT NULL,
        last_sample REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_files_first_sample ON files(first_sample);

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        mjd_start REAL NOT NULL,
        mjd_end REAL NOT NULL,
        tag TEXT NOT NULL,
        start_comment TEXT NOT NULL,
        end_comment TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tags_start ON tags(mjd_start);
    CREATE INDEX IF NOT EXISTS idx_tags_end ON tags(mjd_end);
";

/// Persistent catalog of one data directory
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
    earliest: Mjd,
}

impl Catalog {
    /// Create or open the catalog `database_name` inside `data_dir`
    pub fn open(data_dir: &Path, database_name: &str) -> StorageResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(database_name);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::init(conn, Some(path))
    }

    /// Create a catalog that lives only in memory
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path,
            earliest: EARLIEST_ACCEPTABLE_MJD,
        })
    }

    /// Builder method: set the earliest acceptable sample time
    ///
    /// Records with a bound below this value are considered never closed
    /// and get replaced by the next scan.
    pub fn with_earliest(mut self, earliest: Mjd) -> Self {
        self.earliest = earliest;
        self
    }

    /// Delete a catalog from disk, so that the next open starts from scratch
    ///
    /// Returns `true` if a catalog was found.
    pub fn remove(data_dir: &Path, database_name: &str) -> StorageResult<bool> {
        let path = data_dir.join(database_name);
        if !path.is_file() {
            return Ok(false);
        }

        std::fs::remove_file(&path)?;
        for suffix in ["-wal", "-shm"] {
            let mut side = path.clone().into_os_string();
            side.push(suffix);
            let side = PathBuf::from(side);
            if side.exists() {
                std::fs::remove_file(side)?;
            }
        }
        Ok(true)
    }

    /// Close the database connection
    pub fn close(self) -> StorageResult<()> {
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }

    /// Path of the catalog file (`None` for in-memory catalogs)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn earliest(&self) -> Mjd {
        self.earliest
    }

    /// Look up the record of a file
    pub fn file_record(&self, path: &Path) -> StorageResult<Option<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, size_in_bytes, first_sample, last_sample FROM files WHERE path = ?",
        )?;
        Ok(stmt
            .query_row(params![path_key(path)], file_from_row)
            .optional()?)
    }

    /// Whether a file is catalogued with a valid time range
    pub fn is_indexed(&self, path: &Path) -> StorageResult<bool> {
        Ok(self
            .file_record(path)?
            .map(|record| record.time_range.is_after(self.earliest))
            .unwrap_or(false))
    }

    /// Insert a file record in its own transaction
    ///
    /// Fails with `DuplicatePath` if the file is already catalogued with a
    /// different (valid) time range.
    pub fn upsert_file(&mut self, record: &FileRecord) -> StorageResult<()> {
        let earliest = self.earliest;
        let tx = self.conn.transaction()?;
        upsert_file_in(&tx, record, earliest)?;
        tx.commit()?;
        Ok(())
    }

    /// Insert or replace a tag
    pub fn upsert_tag(&mut self, tag: &TagRecord) -> StorageResult<()> {
        upsert_tag_in(&self.conn, tag)
    }

    /// Start a batch of writes that is committed atomically
    pub fn begin_batch(&mut self) -> StorageResult<CatalogBatch<'_>> {
        Ok(CatalogBatch {
            earliest: self.earliest,
            tx: self.conn.transaction()?,
        })
    }

    /// All tags whose start or end falls within `range`, ordered by start
    ///
    /// A tag that begins before `range` and ends after it is not returned.
    pub fn tags_in_range(&self, range: &TimeRange) -> StorageResult<Vec<TagRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, tag, mjd_start, mjd_end, start_comment, end_comment FROM tags
             WHERE (mjd_start >= ?1 AND mjd_start <= ?2)
                OR (mjd_end >= ?1 AND mjd_end <= ?2)
             ORDER BY mjd_start, id",
        )?;

        let rows = stmt.query_map(params![range.start, range.end], tag_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Look up a tag by id
    pub fn tag_by_id(&self, id: i64) -> StorageResult<Option<TagRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, tag, mjd_start, mjd_end, start_comment, end_comment FROM tags
             WHERE id = ?",
        )?;
        Ok(stmt.query_row(params![id], tag_from_row).optional()?)
    }

    /// All file records, in no particular order
    pub fn all_files(&self) -> StorageResult<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path, size_in_bytes, first_sample, last_sample FROM files")?;
        let rows = stmt.query_map([], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All file records, ordered by their first sample
    pub fn files_by_start(&self) -> StorageResult<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path, size_in_bytes, first_sample, last_sample FROM files
             ORDER BY first_sample",
        )?;
        let rows = stmt.query_map([], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of catalogued files
    pub fn file_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of catalogued tags
    pub fn tag_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// A set of catalog writes committed atomically
///
/// Dropping the batch without calling [`CatalogBatch::commit`] rolls back
/// every write made through it.
pub struct CatalogBatch<'a> {
    tx: Transaction<'a>,
    earliest: Mjd,
}

impl CatalogBatch<'_> {
    pub fn upsert_file(&self, record: &FileRecord) -> StorageResult<()> {
        upsert_file_in(&self.tx, record, self.earliest)
    }

    pub fn upsert_tag(&self, tag: &TagRecord) -> StorageResult<()> {
        upsert_tag_in(&self.tx, tag)
    }

    pub fn commit(self) -> StorageResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn upsert_file_in(conn: &Connection, record: &FileRecord, earliest: Mjd) -> StorageResult<()> {
    let key = path_key(&record.path);
    let existing: Option<(f64, f64)> = conn
        .query_row(
            "SELECT first_sample, last_sample FROM files WHERE path = ?",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let scanned = (record.time_range.start, record.time_range.end);
    match existing {
        None => {
            conn.execute(
                "INSERT INTO files (path, size_in_bytes, first_sample, last_sample)
                 VALUES (?, ?, ?, ?)",
                params![key, record.size_bytes as i64, scanned.0, scanned.1],
            )?;
        }
        Some(recorded) if recorded == scanned => {}
        Some(recorded) if recorded.0 < earliest || recorded.1 < earliest => {
            tracing::debug!("Replacing unclosed entry for {:?}", record.path);
            conn.execute(
                "UPDATE files SET size_in_bytes = ?, first_sample = ?, last_sample = ?
                 WHERE path = ?",
                params![record.size_bytes as i64, scanned.0, scanned.1, key],
            )?;
        }
        Some(recorded) => {
            return Err(StorageError::DuplicatePath {
                path: record.path.clone(),
                recorded,
                scanned,
            });
        }
    }

    Ok(())
}

/// Whole-record overwrite by id, except that a closed tag is never replaced
/// by a still-open one
fn upsert_tag_in(conn: &Connection, tag: &TagRecord) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO tags (id, mjd_start, mjd_end, tag, start_comment, end_comment)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            mjd_start = excluded.mjd_start,
            mjd_end = excluded.mjd_end,
            tag = excluded.tag,
            start_comment = excluded.start_comment,
            end_comment = excluded.end_comment
         WHERE NOT (tags.mjd_end >= tags.mjd_start
                    AND excluded.mjd_end < excluded.mjd_start)",
        params![
            tag.id,
            tag.start,
            tag.end,
            tag.name,
            tag.start_comment,
            tag.end_comment
        ],
    )?;
    Ok(())
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let path: String = row.get(0)?;
    let size: i64 = row.get(1)?;
    Ok(FileRecord {
        path: PathBuf::from(path),
        size_bytes: size as u64,
        time_range: TimeRange {
            start: row.get(2)?,
            end: row.get(3)?,
        },
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<TagRecord> {
    Ok(TagRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        start: row.get(2)?,
        end: row.get(3)?,
        start_comment: row.get(4)?,
        end_comment: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(path: &str, start: f64, end: f64) -> FileRecord {
        FileRecord::new(path, 1024, TimeRange::new(start, end).unwrap())
    }

    #[test]
    fn test_catalog_creation() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::open(dir.path(), DEFAULT_DATABASE_NAME).unwrap();
        assert_eq!(catalog.file_count().unwrap(), 0);
        assert_eq!(catalog.tag_count().unwrap(), 0);
        assert!(dir.path().join("index.db").is_file());
    }

    #[test]
    fn test_upsert_file_is_idempotent() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let rec = record("/data/a.rec", 59000.0, 59000.5);

        catalog.upsert_file(&rec).unwrap();
        catalog.upsert_file(&rec).unwrap();

        assert_eq!(catalog.file_count().unwrap(), 1);
        assert_eq!(
            catalog.file_record(Path::new("/data/a.rec")).unwrap(),
            Some(rec)
        );
    }

    #[test]
    fn test_upsert_file_conflicting_range() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog
            .upsert_file(&record("/data/a.rec", 59000.0, 59000.5))
            .unwrap();

        let err = catalog
            .upsert_file(&record("/data/a.rec", 59000.0, 59000.6))
            .unwrap_err();
        match err {
            StorageError::DuplicatePath {
                recorded, scanned, ..
            } => {
                assert_eq!(recorded, (59000.0, 59000.5));
                assert_eq!(scanned, (59000.0, 59000.6));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unclosed_file_entry_is_replaced() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        let unclosed = FileRecord::new(
            "/data/a.rec",
            10,
            TimeRange {
                start: -1.0,
                end: -1.0,
            },
        );
        catalog.upsert_file(&unclosed).unwrap();
        assert!(!catalog.is_indexed(Path::new("/data/a.rec")).unwrap());

        catalog
            .upsert_file(&record("/data/a.rec", 59000.0, 59000.5))
            .unwrap();
        assert!(catalog.is_indexed(Path::new("/data/a.rec")).unwrap());
        assert_eq!(catalog.file_count().unwrap(), 1);
    }

    #[test]
    fn test_tag_upsert_converges() {
        let mut catalog = Catalog::open_in_memory().unwrap();

        // Started in one file, still open when the file was closed
        catalog
            .upsert_tag(&TagRecord::new(42, "TURNON", 59000.1, -1.0).comments("go", ""))
            .unwrap();
        // Seen again, complete, in the next file
        catalog
            .upsert_tag(&TagRecord::new(42, "TURNON", 59000.1, 59000.3).comments("go", "done"))
            .unwrap();

        assert_eq!(catalog.tag_count().unwrap(), 1);
        let tag = catalog.tag_by_id(42).unwrap().unwrap();
        assert_eq!(tag.end, 59000.3);
        assert_eq!(tag.end_comment, "done");
    }

    #[test]
    fn test_closed_tag_not_replaced_by_open_one() {
        let mut catalog = Catalog::open_in_memory().unwrap();

        catalog
            .upsert_tag(&TagRecord::new(42, "TURNON", 59000.1, 59000.3))
            .unwrap();
        catalog
            .upsert_tag(&TagRecord::new(42, "TURNON", 59000.1, -1.0))
            .unwrap();

        let tag = catalog.tag_by_id(42).unwrap().unwrap();
        assert_eq!(tag.end, 59000.3);
    }

    #[test]
    fn test_tags_in_range() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert_tag(&TagRecord::new(1, "BEFORE", 1.0, 2.0)).unwrap();
        catalog.upsert_tag(&TagRecord::new(2, "STARTS_INSIDE", 4.5, 7.0)).unwrap();
        catalog.upsert_tag(&TagRecord::new(3, "ENDS_INSIDE", 3.0, 4.2)).unwrap();
        catalog.upsert_tag(&TagRecord::new(4, "INSIDE", 4.3, 4.4)).unwrap();
        catalog.upsert_tag(&TagRecord::new(5, "SPANS", 3.0, 8.0)).unwrap();
        catalog.upsert_tag(&TagRecord::new(6, "AFTER", 9.0, 10.0)).unwrap();

        let tags = catalog
            .tags_in_range(&TimeRange::new(4.0, 5.0).unwrap())
            .unwrap();
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();

        // A tag spanning the whole window without touching it is not returned
        assert_eq!(ids, vec![3, 4, 2]);
    }

    #[test]
    fn test_batch_rollback_on_drop() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        {
            let batch = catalog.begin_batch().unwrap();
            batch
                .upsert_file(&record("/data/a.rec", 59000.0, 59000.5))
                .unwrap();
            batch.upsert_tag(&TagRecord::new(1, "X", 59000.0, 59000.1)).unwrap();
        }
        assert_eq!(catalog.file_count().unwrap(), 0);
        assert_eq!(catalog.tag_count().unwrap(), 0);

        let batch = catalog.begin_batch().unwrap();
        batch
            .upsert_file(&record("/data/a.rec", 59000.0, 59000.5))
            .unwrap();
        batch.commit().unwrap();
        assert_eq!(catalog.file_count().unwrap(), 1);
    }

    #[test]
    fn test_files_by_start() {
        let mut catalog = Catalog::open_in_memory().unwrap();
        catalog.upsert_file(&record("/data/c.rec", 59002.0, 59002.5)).unwrap();
        catalog.upsert_file(&record("/data/a.rec", 59000.0, 59000.5)).unwrap();
        catalog.upsert_file(&record("/data/b.rec", 59001.0, 59001.5)).unwrap();

        let files = catalog.files_by_start().unwrap();
        let names: Vec<&str> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.rec", "b.rec", "c.rec"]);
        assert_eq!(catalog.all_files().unwrap().len(), 3);
    }

    #[test]
    fn test_persistence_and_remove() {
        let dir = tempdir().unwrap();

        {
            let mut catalog = Catalog::open(dir.path(), "test.db").unwrap();
            catalog
                .upsert_file(&record("/data/a.rec", 59000.0, 59000.5))
                .unwrap();
            catalog.upsert_tag(&TagRecord::new(1, "X", 59000.0, 59000.1)).unwrap();
            catalog.close().unwrap();
        }

        {
            let catalog = Catalog::open(dir.path(), "test.db").unwrap();
            assert_eq!(catalog.file_count().unwrap(), 1);
            assert_eq!(catalog.tag_count().unwrap(), 1);
            catalog.close().unwrap();
        }

        assert!(Catalog::remove(dir.path(), "test.db").unwrap());
        assert!(!Catalog::remove(dir.path(), "test.db").unwrap());

        let catalog = Catalog::open(dir.path(), "test.db").unwrap();
        assert_eq!(catalog.file_count().unwrap(), 0);
    }
}
