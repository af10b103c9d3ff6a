//! Archive Query Engine
//!
//! Answers the two questions callers ask the archive:
//!
//! - **TagQuery**: which tags were active within a time window
//! - **SeriesQuery**: the samples of one channel within a time window, as a
//!   single series even when the window spans many files
//! - **HandleCache**: keeps recently used files open between queries
//!
//! # Time windows
//!
//! Every query takes anything implementing [`QueryWindow`]: a `TimeRange`,
//! a pair of MJD numbers, a pair of date strings, or a `TagRecord` standing
//! for the interval the tag covers.
//!
//! ```rust,ignore
//! use stripdb::query::{HandleCache, SeriesQuery};
//!
//! let mut cache = HandleCache::new(16);
//! let series = SeriesQuery::new(&index, &reader, &mut cache)
//!     .load(("2021-12-10 10:00:00", "2021-12-10 12:00:00"), &channel)?;
//! ```

mod cache;
mod error;
mod series;
mod tags;

pub use cache::{HandleCache, DEFAULT_MAX_OPEN_FILES};
pub use error::{QueryError, QueryResult};
pub use series::SeriesQuery;
pub use tags::TagQuery;

use crate::storage::{parse_mjd, Mjd, TagRecord, TimeRange};

/// Something that can be turned into the time window of a query
pub trait QueryWindow {
    fn window(&self) -> QueryResult<TimeRange>;
}

impl QueryWindow for TimeRange {
    fn window(&self) -> QueryResult<TimeRange> {
        Ok(TimeRange::new(self.start, self.end)?)
    }
}

impl QueryWindow for (Mjd, Mjd) {
    fn window(&self) -> QueryResult<TimeRange> {
        Ok(TimeRange::new(self.0, self.1)?)
    }
}

impl QueryWindow for (&str, &str) {
    fn window(&self) -> QueryResult<TimeRange> {
        Ok(TimeRange::new(parse_mjd(self.0)?, parse_mjd(self.1)?)?)
    }
}

/// The interval covered by the tag
impl QueryWindow for TagRecord {
    fn window(&self) -> QueryResult<TimeRange> {
        Ok(TimeRange::try_from(self)?)
    }
}

impl<T: QueryWindow + ?Sized> QueryWindow for &T {
    fn window(&self) -> QueryResult<TimeRange> {
        (**self).window()
    }
}
