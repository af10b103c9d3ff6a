//! Tag lookups

use tracing::debug;

use crate::index::Catalog;
use crate::query::{QueryResult, QueryWindow};
use crate::storage::TagRecord;

/// Finds the tags recorded within a time window
pub struct TagQuery<'a> {
    catalog: &'a Catalog,
}

impl<'a> TagQuery<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Tags starting or ending within `window`, ordered by start time
    ///
    /// A tag that begins before the window and ends after it is not
    /// returned.
    pub fn in_range(&self, window: impl QueryWindow) -> QueryResult<Vec<TagRecord>> {
        let range = window.window()?;
        let tags = self.catalog.tags_in_range(&range)?;
        debug!("{} tags within {}", tags.len(), range);
        Ok(tags)
    }

    /// Look up a single tag by its identifier
    pub fn by_id(&self, id: i64) -> QueryResult<Option<TagRecord>> {
        Ok(self.catalog.tag_by_id(id)?)
    }
}
