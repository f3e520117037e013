//! Sort indices: ordered key sequences maintained per field.
//!
//! An index for field `f` lists every key of the table, ascending by the
//! sort value of `record[f]`. Indices are never spliced; any mutation that
//! could move a key rebuilds the whole sequence for that field.

use crate::records::table::RecordTable;
use crate::types::{Key, Record};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Numeric sort value of a field, or `None` when the value is not numeric.
///
/// Numbers, booleans (`false` = 0, `true` = 1) and strings holding a finite
/// number are numeric. Missing fields, nulls, other strings, arrays and
/// objects are not.
pub fn sort_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Total order over sort values: non-numeric values are equal to each other
/// and sort below every number.
pub fn compare_sort_values(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Tracked sort indices, keyed by field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortIndexes {
    indices: BTreeMap<String, Vec<Key>>,
}

impl SortIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap indices loaded from a snapshot. They are trusted as-is; call
    /// [`SortIndexes::refresh_all`] to re-derive them from the records.
    pub fn from_parts(indices: BTreeMap<String, Vec<Key>>) -> Self {
        Self { indices }
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<Key>> {
        &self.indices
    }

    /// Build an ascending key sequence for `field`, optionally restricted to
    /// records matching `filter`.
    ///
    /// The sort is stable over natural key order, so equal values always come
    /// out in the same order.
    pub fn build(
        table: &RecordTable,
        field: &str,
        filter: Option<&dyn Fn(&Record) -> bool>,
    ) -> Vec<Key> {
        let mut pairs: Vec<(&Key, Option<f64>)> = table
            .iter()
            .filter(|(_, record)| filter.map_or(true, |f| f(record)))
            .map(|(key, record)| (key, sort_value(record.get(field))))
            .collect();

        pairs.sort_by(|a, b| compare_sort_values(a.1, b.1));

        pairs.into_iter().map(|(key, _)| key.clone()).collect()
    }

    /// Get the tracked index for a field.
    pub fn get(&self, field: &str) -> Option<&[Key]> {
        self.indices.get(field).map(Vec::as_slice)
    }

    pub fn is_tracked(&self, field: &str) -> bool {
        self.indices.contains_key(field)
    }

    pub fn tracked_fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.indices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Start tracking `field`, building its index if it is missing or empty.
    ///
    /// Returns true if an index was built.
    pub fn ensure(&mut self, table: &RecordTable, field: &str) -> bool {
        match self.indices.get(field) {
            Some(keys) if !keys.is_empty() => false,
            _ => {
                let keys = Self::build(table, field, None);
                tracing::debug!(field, keys = keys.len(), "built sort index");
                self.indices.insert(field.to_string(), keys);
                true
            }
        }
    }

    /// Stop tracking `field`. Returns true if it was tracked.
    pub fn untrack(&mut self, field: &str) -> bool {
        self.indices.remove(field).is_some()
    }

    /// Rebuild the named fields. Names that are not tracked are ignored.
    pub fn refresh<'f>(
        &mut self,
        table: &RecordTable,
        fields: impl IntoIterator<Item = &'f str>,
    ) {
        for field in fields {
            if let Some(keys) = self.indices.get_mut(field) {
                *keys = Self::build(table, field, None);
            }
        }
    }

    /// Rebuild every tracked index.
    pub fn refresh_all(&mut self, table: &RecordTable) {
        for (field, keys) in self.indices.iter_mut() {
            *keys = Self::build(table, field, None);
        }
    }
}
