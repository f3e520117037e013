//! Key to record mapping and the key generator.

use crate::types::{Key, Record};
use std::collections::BTreeMap;

/// First key handed out by a fresh table.
pub const FIRST_ID: u64 = 1;

/// Owns every record of a database plus the monotonic id counter.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordTable {
    /// Next auto-generated key. Never decremented.
    next_id: u64,

    /// Records in natural key order.
    records: BTreeMap<Key, Record>,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self {
            next_id: FIRST_ID,
            records: BTreeMap::new(),
        }
    }
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from persisted parts.
    pub fn from_parts(next_id: u64, records: BTreeMap<Key, Record>) -> Self {
        Self { next_id, records }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn records(&self) -> &BTreeMap<Key, Record> {
        &self.records
    }

    /// Get a record by key.
    pub fn get(&self, key: &Key) -> Option<&Record> {
        self.records.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &Key) -> Option<&mut Record> {
        self.records.get_mut(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.records.contains_key(key)
    }

    /// Hand out the current counter value as a key and advance the counter.
    pub fn generate_key(&mut self) -> Key {
        let key = Key::from(self.next_id);
        self.next_id += 1;
        key
    }

    /// Number of records, or of records matching `filter` when given.
    pub fn count(&self, filter: Option<&dyn Fn(&Record) -> bool>) -> usize {
        match filter {
            Some(filter) => self.records.values().filter(|r| filter(r)).count(),
            None => self.records.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate keys in natural order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &Key> + '_ {
        self.records.keys()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Key, &Record)> + '_ {
        self.records.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&Key, &mut Record)> + '_ {
        self.records.iter_mut()
    }

    /// Store a record. Returns false, leaving the table untouched, if the key
    /// is already taken.
    pub(crate) fn insert(&mut self, key: Key, record: Record) -> bool {
        if self.records.contains_key(&key) {
            return false;
        }
        self.records.insert(key, record);
        true
    }

    pub(crate) fn remove(&mut self, key: &Key) -> Option<Record> {
        self.records.remove(key)
    }
}
