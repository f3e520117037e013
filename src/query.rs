//! Filtered, paginated, ordered retrieval.
//!
//! Pagination follows a signed window: `start` is 1-based and `count`
//! picks the direction. A positive count walks the ordering forward, a
//! negative count walks it backward, and zero means "everything, backward".

use crate::database::Database;
use crate::records::SortIndexes;
use crate::types::{Key, Record};

/// Pagination window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit {
    /// 1-based position of the first record returned.
    pub start: i64,

    /// Number of records and direction. `None` means every record,
    /// ascending; `Some(0)` means every record, descending.
    pub count: Option<i64>,
}

impl Default for Limit {
    fn default() -> Self {
        Self {
            start: 1,
            count: None,
        }
    }
}

impl Limit {
    pub fn new(start: i64, count: i64) -> Self {
        Self {
            start,
            count: Some(count),
        }
    }

    /// Every record in descending order.
    pub fn descending() -> Self {
        Self::new(1, 0)
    }
}

/// A query: optional filter, optional sort field and a window.
pub struct Query<'a> {
    filter: Option<Box<dyn Fn(&Record) -> bool + 'a>>,
    order_by: Option<String>,
    limit: Limit,
}

impl Default for Query<'_> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: None,
            limit: Limit::default(),
        }
    }
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("filtered", &self.filter.is_some())
            .field("order_by", &self.order_by)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<'a> Query<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Fn(&Record) -> bool + 'a) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn limit(mut self, start: i64, count: i64) -> Self {
        self.limit = Limit::new(start, count);
        self
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = limit;
        self
    }

    pub fn order_field(&self) -> Option<&str> {
        self.order_by.as_deref()
    }

    fn predicate(&self) -> Option<&dyn Fn(&Record) -> bool> {
        self.filter.as_deref().map(|f| f as &dyn Fn(&Record) -> bool)
    }
}

/// Where the traversal order comes from.
enum Traversal<'k> {
    /// Natural key order; the filter still applies.
    Natural,
    /// A tracked index covering every record; the filter still applies.
    Tracked(&'k [Key]),
    /// An index built for this query with the filter already applied.
    Filtered(Vec<Key>),
}

impl Database {
    /// Run a query. Results come back in traversal order.
    ///
    /// A sort field without a tracked index is served from a throw-away
    /// index built over the matching records only. Both paths return the
    /// same records.
    pub fn find(&self, query: &Query<'_>) -> Vec<&Record> {
        let total = self.table.len() as i64;
        let mut start = query.limit.start;
        let mut count = query.limit.count.unwrap_or(total);
        if count == 0 {
            count = -total;
        }
        // Out-of-range windows clamp instead of overflowing.
        start = start.saturating_sub(1);

        let ascending = count > 0;
        let end = start.saturating_add(count.saturating_abs()).saturating_add(1);

        let filter = query.predicate();
        let traversal = match query.order_field() {
            None => Traversal::Natural,
            Some(field) => match self.indexes.get(field) {
                Some(keys) => Traversal::Tracked(keys),
                None => Traversal::Filtered(SortIndexes::build(&self.table, field, filter)),
            },
        };

        match &traversal {
            Traversal::Natural => {
                let keys = self.table.keys();
                if ascending {
                    self.collect(keys, filter, start, end)
                } else {
                    self.collect(keys.rev(), filter, start, end)
                }
            }
            Traversal::Tracked(keys) => {
                if ascending {
                    self.collect(keys.iter(), filter, start, end)
                } else {
                    self.collect(keys.iter().rev(), filter, start, end)
                }
            }
            Traversal::Filtered(keys) => {
                if ascending {
                    self.collect(keys.iter(), None, start, end)
                } else {
                    self.collect(keys.iter().rev(), None, start, end)
                }
            }
        }
    }

    /// Walk `keys`, counting matches, and keep those with
    /// `start < position < end`.
    fn collect<'k>(
        &self,
        keys: impl Iterator<Item = &'k Key>,
        filter: Option<&dyn Fn(&Record) -> bool>,
        start: i64,
        end: i64,
    ) -> Vec<&Record> {
        let mut found = Vec::new();
        let mut num = 0i64;

        for key in keys {
            let Some(record) = self.table.get(key) else {
                continue;
            };
            if let Some(filter) = filter {
                if !filter(record) {
                    continue;
                }
            }

            num += 1;
            if num > start && num < end {
                found.push(record);
            }
            // Positions past end - 1 are never kept.
            if num >= end - 1 {
                break;
            }
        }
        found
    }

    /// Direct lookup by key.
    pub fn find_by_key(&self, key: &str) -> Option<&Record> {
        self.table.get(&Key::from(key))
    }

    /// First record, in natural key order, matching `filter`.
    pub fn find_one(&self, filter: &dyn Fn(&Record) -> bool) -> Option<&Record> {
        self.table
            .iter()
            .map(|(_, record)| record)
            .find(|record| filter(*record))
    }
}
