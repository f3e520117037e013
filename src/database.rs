//! The persisted unit: records, the key counter and sort indices.
//!
//! Every mutation keeps tracked indices consistent before returning. The
//! dirty counter is not part of the database; [`Store`](crate::Store) keeps it.

use crate::records::{RecordTable, SortIndexes};
use crate::types::{Key, Record};

/// Which indices `update_by_key` rebuilds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyUpdateRefresh {
    /// Rebuild tracked indices named by the updated fields.
    #[default]
    TouchedFields,

    /// Rebuild only an index whose field name equals the record's key.
    ///
    /// Indices on the updated fields go stale until the next full refresh.
    MatchingKeyName,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Database {
    pub(crate) table: RecordTable,
    pub(crate) indexes: SortIndexes,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(table: RecordTable, indexes: SortIndexes) -> Self {
        Self { table, indexes }
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    pub fn indexes(&self) -> &SortIndexes {
        &self.indexes
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of records, or of records matching `filter`.
    pub fn count(&self, filter: Option<&dyn Fn(&Record) -> bool>) -> usize {
        self.table.count(filter)
    }

    /// Start tracking a sort field. Returns true if an index was built.
    pub fn track(&mut self, field: &str) -> bool {
        self.indexes.ensure(&self.table, field)
    }

    pub fn untrack(&mut self, field: &str) -> bool {
        self.indexes.untrack(field)
    }

    /// Rebuild every tracked index from the records.
    pub fn refresh_all(&mut self) {
        self.indexes.refresh_all(&self.table);
    }

    // --- Mutations ---

    /// Insert a record under `key`, or under a generated key when `None`.
    ///
    /// Returns `None` if the key is already taken; the existing record is
    /// left untouched. A generated key is consumed even then.
    pub fn insert(&mut self, record: Record, key: Option<&str>) -> Option<Key> {
        let key = match key {
            Some(key) => Key::from(key),
            None => self.table.generate_key(),
        };

        if !self.table.insert(key.clone(), record) {
            return None;
        }

        self.indexes.refresh_all(&self.table);
        Some(key)
    }

    /// Overwrite the given fields of the record at `key`.
    pub fn update_by_key(&mut self, key: &str, fields: &Record, scope: KeyUpdateRefresh) -> bool {
        let key = Key::from(key);
        let Some(record) = self.table.get_mut(&key) else {
            return false;
        };

        overwrite(record, fields);

        match scope {
            KeyUpdateRefresh::TouchedFields => {
                self.indexes
                    .refresh(&self.table, fields.keys().map(String::as_str));
            }
            KeyUpdateRefresh::MatchingKeyName => {
                self.indexes.refresh(&self.table, [key.as_str()]);
            }
        }
        true
    }

    /// Overwrite the given fields of the first record matching `filter`.
    pub fn update_one(&mut self, filter: &dyn Fn(&Record) -> bool, fields: &Record) -> bool {
        let Some(record) = self
            .table
            .iter_mut()
            .map(|(_, record)| record)
            .find(|record| filter(&**record))
        else {
            return false;
        };

        overwrite(record, fields);
        self.indexes
            .refresh(&self.table, fields.keys().map(String::as_str));
        true
    }

    /// Overwrite the given fields of every record matching `filter`.
    ///
    /// Returns the number of records changed. Indices are rebuilt once.
    pub fn update_all(&mut self, filter: &dyn Fn(&Record) -> bool, fields: &Record) -> usize {
        let mut changed = 0;
        for (_, record) in self.table.iter_mut() {
            if filter(&*record) {
                overwrite(record, fields);
                changed += 1;
            }
        }

        if changed > 0 {
            self.indexes.refresh_all(&self.table);
        }
        changed
    }

    /// Remove the record at `key`.
    pub fn delete_by_key(&mut self, key: &str) -> bool {
        if self.table.remove(&Key::from(key)).is_none() {
            return false;
        }
        self.indexes.refresh_all(&self.table);
        true
    }
}

fn overwrite(record: &mut Record, fields: &Record) {
    for (name, value) in fields {
        record.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::into_record;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        into_record(value).unwrap()
    }

    fn scores() -> Database {
        let mut db = Database::new();
        for score in [30, 10, 50, 20, 40] {
            db.insert(record(json!({ "score": score })), None).unwrap();
        }
        db
    }

    fn index(db: &Database, field: &str) -> Vec<String> {
        db.indexes()
            .get(field)
            .unwrap()
            .iter()
            .map(|k| k.to_string())
            .collect()
    }

    #[test]
    fn test_insert_generates_keys() {
        let db = scores();
        assert_eq!(db.len(), 5);
        assert_eq!(db.table().next_id(), 6);
    }

    #[test]
    fn test_insert_duplicate_key_fails() {
        let mut db = Database::new();
        assert_eq!(db.insert(record(json!({"v": 1})), Some("a")), Some(Key::from("a")));
        assert_eq!(db.insert(record(json!({"v": 2})), Some("a")), None);
        assert_eq!(db.table().get(&"a".into()).unwrap()["v"], 1);
    }

    #[test]
    fn test_insert_refreshes_all_indexes() {
        let mut db = scores();
        db.track("score");
        db.track("other");
        db.insert(record(json!({"score": 5})), None).unwrap();
        assert_eq!(index(&db, "score")[0], "6");
        assert_eq!(index(&db, "other").len(), 6);
    }

    #[test]
    fn test_update_by_key_touched_fields() {
        let mut db = scores();
        db.track("score");
        let zero = record(json!({"score": 0}));
        assert!(db.update_by_key("3", &zero, KeyUpdateRefresh::TouchedFields));
        assert_eq!(index(&db, "score"), vec!["3", "2", "4", "1", "5"]);
    }

    #[test]
    fn test_update_by_key_matching_key_name_leaves_field_index_stale() {
        let mut db = scores();
        db.track("score");
        db.track("3");
        let before = index(&db, "score");

        let zero = record(json!({"score": 0}));
        assert!(db.update_by_key("3", &zero, KeyUpdateRefresh::MatchingKeyName));
        assert_eq!(index(&db, "score"), before);
        assert_eq!(db.table().get(&"3".into()).unwrap()["score"], 0);

        db.refresh_all();
        assert_eq!(index(&db, "score")[0], "3");
    }

    #[test]
    fn test_update_by_key_matching_key_name_rebuilds_index_named_like_key() {
        let mut db = Database::new();
        for value in [10, 20] {
            db.insert(record(json!({ "1": value, "score": value })), None).unwrap();
        }
        db.track("1");
        db.track("score");
        assert_eq!(index(&db, "1"), vec!["1", "2"]);

        let raise = record(json!({"1": 100, "score": 100}));
        assert!(db.update_by_key("1", &raise, KeyUpdateRefresh::MatchingKeyName));

        // Only the index whose name equals the key moves.
        assert_eq!(index(&db, "1"), vec!["2", "1"]);
        assert_eq!(index(&db, "score"), vec!["1", "2"]);
    }

    #[test]
    fn test_update_by_key_missing() {
        let mut db = scores();
        let one = record(json!({"score": 1}));
        assert!(!db.update_by_key("99", &one, KeyUpdateRefresh::default()));
    }

    #[test]
    fn test_update_one_refreshes_touched_field_only() {
        let mut db = scores();
        db.track("score");
        db.track("rank");
        let rank_before = index(&db, "rank");

        let is_fifty = |r: &Record| r["score"] == 50;
        assert!(db.update_one(&is_fifty, &record(json!({"score": 1}))));
        assert_eq!(index(&db, "score")[0], "3");
        assert_eq!(index(&db, "rank"), rank_before);

        let none = |_: &Record| false;
        assert!(!db.update_one(&none, &record(json!({"score": 1}))));
    }

    #[test]
    fn test_update_all_counts_and_refreshes() {
        let mut db = scores();
        db.track("score");
        let over_25 = |r: &Record| r["score"].as_i64().unwrap_or(0) > 25;
        let capped = record(json!({"score": 0, "capped": true}));
        assert_eq!(db.update_all(&over_25, &capped), 3);
        assert_eq!(index(&db, "score"), vec!["1", "3", "5", "2", "4"]);
        assert_eq!(db.count(Some(&|r: &Record| r.contains_key("capped"))), 3);
    }

    #[test]
    fn test_delete_removes_from_indexes() {
        let mut db = scores();
        db.track("score");
        assert!(db.delete_by_key("3"));
        assert!(!db.delete_by_key("3"));
        assert!(!index(&db, "score").contains(&"3".to_string()));
        assert_eq!(db.table().next_id(), 6);
    }
}
