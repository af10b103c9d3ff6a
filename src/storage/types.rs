//! Core data types for the archive
//!
//! This module defines the fundamental types used throughout the crate:
//! - `Mjd`: Modified Julian Date timestamps and conversions
//! - `TimeRange`: A closed time interval for queries
//! - `FileRecord`: Catalog entry for one recording file
//! - `TagRecord`: A named experiment phase
//! - `TimeSeries`: Samples of one channel

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::error::{StorageError, StorageResult};

/// Modified Julian Date, in days
pub type Mjd = f64;

/// Any bound below this (2018-01-01) is considered garbage written by the
/// electronics, or a file whose writer never stored its range.
pub const EARLIEST_ACCEPTABLE_MJD: Mjd = 58119.0;

/// MJD of 1970-01-01T00:00:00Z
const UNIX_EPOCH_MJD: f64 = 40587.0;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// Convert a UTC date into a MJD
pub fn mjd_from_datetime(dt: DateTime<Utc>) -> Mjd {
    UNIX_EPOCH_MJD + dt.timestamp_micros() as f64 / MICROS_PER_DAY
}

/// Convert a MJD into a UTC date (microsecond precision)
pub fn datetime_from_mjd(mjd: Mjd) -> Option<DateTime<Utc>> {
    if !mjd.is_finite() {
        return None;
    }
    let micros = ((mjd - UNIX_EPOCH_MJD) * MICROS_PER_DAY).round();
    DateTime::from_timestamp_micros(micros as i64)
}

/// Parse a timestamp given either as a MJD number or as a date
///
/// Accepted date formats are RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`,
/// `YYYY-MM-DDTHH:MM:SS[.fff]` and `YYYY-MM-DD` (all UTC).
pub fn parse_mjd(s: &str) -> StorageResult<Mjd> {
    let s = s.trim();

    if let Ok(value) = s.parse::<f64>() {
        if value.is_finite() {
            return Ok(value);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(mjd_from_datetime(dt.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(mjd_from_datetime(naive.and_utc()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(mjd_from_datetime(naive.and_utc()));
        }
    }

    Err(StorageError::InvalidTime(s.to_string()))
}

/// A closed time interval `[start, end]`, both ends included
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Mjd,
    pub end: Mjd,
}

impl TimeRange {
    /// Create a time range, rejecting `start > end`
    pub fn new(start: Mjd, end: Mjd) -> StorageResult<Self> {
        if start > end || start.is_nan() || end.is_nan() {
            return Err(StorageError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a time range from two date strings (or MJD numbers)
    pub fn from_dates(start: &str, end: &str) -> StorageResult<Self> {
        Self::new(parse_mjd(start)?, parse_mjd(end)?)
    }

    /// Create a time range from two UTC dates
    pub fn from_datetimes(start: DateTime<Utc>, end: DateTime<Utc>) -> StorageResult<Self> {
        Self::new(mjd_from_datetime(start), mjd_from_datetime(end))
    }

    /// Check if a timestamp falls within this range (both ends included)
    pub fn contains(&self, t: Mjd) -> bool {
        t >= self.start && t <= self.end
    }

    /// Check if two closed ranges share at least one instant
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Length of the interval, in days
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether both bounds are at or after `earliest`
    pub fn is_after(&self, earliest: Mjd) -> bool {
        self.start >= earliest && self.end >= earliest
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.9}, {:.9}]", self.start, self.end)
    }
}

impl TryFrom<&TagRecord> for TimeRange {
    type Error = StorageError;

    fn try_from(tag: &TagRecord) -> Result<Self, Self::Error> {
        TimeRange::new(tag.start, tag.end)
    }
}

/// Catalog entry describing one recording file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute, symlink-free path (unique key)
    pub path: PathBuf,
    /// Size of the file when it was scanned
    pub size_bytes: u64,
    /// First and last sample recorded in the file
    pub time_range: TimeRange,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64, time_range: TimeRange) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            time_range,
        }
    }

    /// First sample of the file
    pub fn start(&self) -> Mjd {
        self.time_range.start
    }

    /// Last sample of the file
    pub fn end(&self) -> Mjd {
        self.time_range.end
    }
}

/// A named, timestamped interval describing an experiment phase
///
/// A tag started in one file and stopped in the next one is seen twice by
/// the catalog builder: the first time with no valid `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Unique identifier assigned by the control software
    pub id: i64,
    #[serde(rename = "mjd_start")]
    pub start: Mjd,
    #[serde(rename = "mjd_end")]
    pub end: Mjd,
    #[serde(rename = "tag_name")]
    pub name: String,
    pub start_comment: String,
    pub end_comment: String,
}

impl TagRecord {
    pub fn new(id: i64, name: impl Into<String>, start: Mjd, end: Mjd) -> Self {
        Self {
            id,
            start,
            end,
            name: name.into(),
            start_comment: String::new(),
            end_comment: String::new(),
        }
    }

    /// Builder method: set the comments
    pub fn comments(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_comment = start.into();
        self.end_comment = end.into();
        self
    }

    /// Whether both the start and the stop of the tag have been recorded
    pub fn is_closed(&self) -> bool {
        self.end >= self.start
    }
}

/// Samples of one channel, sorted by time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub times: Vec<Mjd>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    /// Create a series; `times` and `values` must have the same length
    pub fn new(times: Vec<Mjd>, values: Vec<f64>) -> StorageResult<Self> {
        if times.len() != values.len() {
            return Err(StorageError::InvalidFile(format!(
                "{} timestamps but {} values",
                times.len(),
                values.len()
            )));
        }
        Ok(Self { times, values })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first_time(&self) -> Option<Mjd> {
        self.times.first().copied()
    }

    pub fn last_time(&self) -> Option<Mjd> {
        self.times.last().copied()
    }

    /// Keep only the samples whose timestamp falls within `range`
    pub fn clip(self, range: &TimeRange) -> Self {
        let (times, values) = self
            .times
            .into_iter()
            .zip(self.values)
            .filter(|(t, _)| range.contains(*t))
            .unzip();
        Self { times, values }
    }

    /// Append another series at the end of this one
    pub fn extend(&mut self, other: TimeSeries) {
        self.times.extend(other.times);
        self.values.extend(other.values);
    }

    /// Iterate over `(time, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Mjd, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }
}

/// Average of the samples falling within `range`, if any
pub fn extract_mean(series: &TimeSeries, range: &TimeRange) -> Option<f64> {
    let (sum, count) = series
        .iter()
        .filter(|(t, _)| range.contains(*t))
        .fold((0.0, 0usize), |(sum, count), (_, v)| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
