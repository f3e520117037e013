//! Main Store handle tying the database, dirty tracking and persistence
//! together.

use crate::database::{Database, KeyUpdateRefresh};
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::snapshot::{self, Loaded, SnapshotWriter};
use crate::types::{Key, Record};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Callback receiving the outcome of a background save.
pub type SaveCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Snapshot file. `None` keeps the store in memory only.
    pub path: Option<PathBuf>,

    /// Sort fields indexed at open time.
    pub sort_fields: Vec<String>,

    /// Whether ordering a query by an untracked field starts tracking it.
    /// When false such queries use a one-off filtered index.
    pub track_sort_on_query: bool,

    /// Index refresh scope of `update_by_key`.
    pub key_update_refresh: KeyUpdateRefresh,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            sort_fields: Vec::new(),
            track_sort_on_query: true,
            key_update_refresh: KeyUpdateRefresh::default(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a store backed by `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Add a sort field to index at open time.
    pub fn sort_field(mut self, field: impl Into<String>) -> Self {
        self.sort_fields.push(field.into());
        self
    }
}

/// A shared record store.
///
/// All mutations take the write lock and complete before it is released,
/// so readers never see a half-applied change. Each successful mutation
/// bumps the dirty counter by one; [`FlushScheduler`](crate::FlushScheduler)
/// reads and resets it.
pub struct Store {
    config: StoreConfig,

    db: RwLock<Database>,

    /// Mutations since the last flush was issued.
    dirty: AtomicU64,

    /// Ordering ticket for encoded snapshots.
    snapshot_seq: AtomicU64,

    /// Shared with background save threads.
    writer: Arc<SnapshotWriter>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.config.path)
            .field("records", &self.db.read().len())
            .field("dirty", &self.dirty())
            .finish()
    }
}

impl Store {
    /// Open a store.
    ///
    /// A missing snapshot file is created empty. An unreadable or corrupt
    /// snapshot is logged and replaced by an empty in-memory database; the
    /// file itself is left as it was until the next save overwrites it.
    pub fn open(config: StoreConfig) -> Self {
        let db = match &config.path {
            Some(path) => match snapshot::load(path) {
                Ok(loaded) => loaded.into_database(),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load snapshot, starting empty"
                    );
                    Database::new()
                }
            },
            None => Database::new(),
        };
        Self::from_database(config, db)
    }

    /// Open a store, reporting snapshot read and parse failures.
    pub fn open_strict(config: StoreConfig) -> Result<Self> {
        let db = match &config.path {
            Some(path) => match snapshot::load(path)? {
                Loaded::Existing(db) | Loaded::Created(db) => db,
            },
            None => Database::new(),
        };
        Ok(Self::from_database(config, db))
    }

    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        Self::open(StoreConfig::default())
    }

    fn from_database(config: StoreConfig, mut db: Database) -> Self {
        // Loaded indices are re-derived so a stale file cannot break them.
        db.refresh_all();

        let mut built = 0;
        for field in &config.sort_fields {
            if db.track(field) {
                built += 1;
            }
        }

        tracing::debug!(
            path = ?config.path,
            records = db.len(),
            indexes = db.indexes().len(),
            "opened store"
        );

        Self {
            config,
            db: RwLock::new(db),
            dirty: AtomicU64::new(built),
            snapshot_seq: AtomicU64::new(0),
            writer: Arc::new(SnapshotWriter::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.config.path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.config.path.is_some()
    }

    /// Run `f` against the database under the read lock.
    pub fn with_database<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        f(&self.db.read())
    }

    // --- Dirty tracking ---

    /// Mutations since the counter was last reset.
    pub fn dirty(&self) -> u64 {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Read and reset the dirty counter.
    pub fn take_dirty(&self) -> u64 {
        self.dirty.swap(0, Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::SeqCst);
    }

    // --- Queries ---

    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }

    /// Number of records, or of records matching `filter`.
    pub fn count(&self, filter: Option<&dyn Fn(&Record) -> bool>) -> usize {
        self.db.read().count(filter)
    }

    pub fn find_by_key(&self, key: &str) -> Option<Record> {
        self.db.read().find_by_key(key).cloned()
    }

    pub fn find_one(&self, filter: impl Fn(&Record) -> bool) -> Option<Record> {
        self.db.read().find_one(&filter).cloned()
    }

    /// Run a query, cloning the matching records out of the store.
    pub fn find(&self, query: &Query<'_>) -> Vec<Record> {
        if self.config.track_sort_on_query {
            if let Some(field) = query.order_field() {
                let tracked = self.db.read().indexes().is_tracked(field);
                if !tracked {
                    self.track(field);
                }
            }
        }

        self.db.read().find(query).into_iter().cloned().collect()
    }

    // --- Mutations ---

    /// Start maintaining a sort index for `field`.
    ///
    /// Indices are part of the snapshot, so building one marks the store
    /// dirty.
    pub fn track(&self, field: &str) -> bool {
        let built = self.db.write().track(field);
        if built {
            self.mark_dirty();
        }
        built
    }

    pub fn untrack(&self, field: &str) -> bool {
        let removed = self.db.write().untrack(field);
        if removed {
            self.mark_dirty();
        }
        removed
    }

    /// Insert a record under `key`, or a generated key when `None`.
    ///
    /// Returns `None` if the key is taken.
    pub fn insert(&self, record: Record, key: Option<&str>) -> Option<Key> {
        let mut db = self.db.write();
        let key = db.insert(record, key)?;
        self.mark_dirty();
        Some(key)
    }

    pub fn update_by_key(&self, key: &str, fields: &Record) -> bool {
        let mut db = self.db.write();
        let updated = db.update_by_key(key, fields, self.config.key_update_refresh);
        if updated {
            self.mark_dirty();
        }
        updated
    }

    pub fn update_one(&self, filter: impl Fn(&Record) -> bool, fields: &Record) -> bool {
        let mut db = self.db.write();
        let updated = db.update_one(&filter, fields);
        if updated {
            self.mark_dirty();
        }
        updated
    }

    /// Update every matching record. Counts as a single mutation.
    pub fn update_all(&self, filter: impl Fn(&Record) -> bool, fields: &Record) -> usize {
        let mut db = self.db.write();
        let changed = db.update_all(&filter, fields);
        if changed > 0 {
            self.mark_dirty();
        }
        changed
    }

    pub fn delete_by_key(&self, key: &str) -> bool {
        let mut db = self.db.write();
        let deleted = db.delete_by_key(key);
        if deleted {
            self.mark_dirty();
        }
        deleted
    }

    // --- Persistence ---

    /// Encode the current state and take a snapshot ticket.
    fn encode(&self) -> Result<(u64, Vec<u8>)> {
        let db = self.db.read();
        let seq = self.snapshot_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((seq, snapshot::encode(&db)?))
    }

    /// Write the snapshot now, blocking until it is on disk.
    pub fn save(&self) -> Result<()> {
        let path = self.path().ok_or(StoreError::NotPersistent)?;
        let (seq, bytes) = self.encode()?;
        self.writer.write(path, seq, &bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved snapshot");
        Ok(())
    }

    /// Write the snapshot on a background thread. Failures are logged.
    ///
    /// The state is captured before this returns; later mutations are not
    /// part of this save.
    pub fn save_async(&self) -> Option<JoinHandle<()>> {
        self.spawn_save(None)
    }

    /// Like [`Store::save_async`], reporting the outcome to `on_complete`.
    pub fn save_async_with(
        &self,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Option<JoinHandle<()>> {
        self.spawn_save(Some(Box::new(on_complete)))
    }

    fn spawn_save(&self, on_complete: Option<SaveCallback>) -> Option<JoinHandle<()>> {
        let report = move |result: Result<()>| match on_complete {
            Some(callback) => callback(result),
            None => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "background save failed");
                }
            }
        };

        let Some(path) = self.config.path.clone() else {
            report(Err(StoreError::NotPersistent));
            return None;
        };

        let (seq, bytes) = match self.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                report(Err(e));
                return None;
            }
        };

        let writer = Arc::clone(&self.writer);
        Some(thread::spawn(move || {
            let result = writer.write(&path, seq, &bytes).map(|written| {
                tracing::debug!(path = %path.display(), written, "background save finished");
            });
            report(result);
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::into_record;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> Record {
        into_record(value).unwrap()
    }

    #[test]
    fn test_mutations_bump_dirty_once() {
        let store = Store::in_memory();
        store.insert(record(json!({"v": 1})), None).unwrap();
        store.insert(record(json!({"v": 2})), None).unwrap();
        assert_eq!(store.dirty(), 2);

        assert_eq!(store.update_all(|_| true, &record(json!({"seen": true}))), 2);
        assert_eq!(store.dirty(), 3);

        assert_eq!(store.take_dirty(), 3);
        assert_eq!(store.dirty(), 0);
    }

    #[test]
    fn test_failed_mutations_do_not_dirty() {
        let store = Store::in_memory();
        store.insert(record(json!({"v": 1})), Some("a")).unwrap();
        store.take_dirty();

        assert!(store.insert(record(json!({"v": 2})), Some("a")).is_none());
        assert!(!store.update_by_key("b", &record(json!({"v": 3}))));
        assert!(!store.update_one(|_| false, &record(json!({"v": 3}))));
        assert_eq!(store.update_all(|_| false, &record(json!({"v": 3}))), 0);
        assert!(!store.delete_by_key("b"));
        assert_eq!(store.dirty(), 0);
    }

    #[test]
    fn test_find_tracks_sort_field() {
        let store = Store::in_memory();
        store.insert(record(json!({"n": 2})), None);
        store.find(&Query::new().order_by("n"));
        assert!(store.with_database(|db| db.indexes().is_tracked("n")));
    }

    #[test]
    fn test_find_without_tracking() {
        let store = Store::open(StoreConfig {
            track_sort_on_query: false,
            ..Default::default()
        });
        store.insert(record(json!({"n": 2})), None);
        store.insert(record(json!({"n": 1})), None);
        let found = store.find(&Query::new().order_by("n"));
        assert_eq!(found[0]["n"], 1);
        assert!(!store.with_database(|db| db.indexes().is_tracked("n")));
    }

    #[test]
    fn test_sort_fields_built_at_open() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::file(dir.path().join("db.json")).sort_field("score");
        let store = Store::open(config);
        assert!(store.with_database(|db| db.indexes().is_tracked("score")));
        assert_eq!(store.dirty(), 1);
    }

    #[test]
    fn test_save_in_memory_is_error() {
        let store = Store::in_memory();
        assert!(matches!(store.save(), Err(StoreError::NotPersistent)));
        assert!(store.save_async().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, b"{ broken").unwrap();

        let store = Store::open(StoreConfig::file(&path));
        assert!(store.is_empty());
        assert_eq!(std::fs::read(&path).unwrap(), b"{ broken");

        assert!(matches!(
            Store::open_strict(StoreConfig::file(&path)),
            Err(StoreError::Deserialization { .. })
        ));
    }

    #[test]
    fn test_save_async_reports_outcome() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::file(dir.path().join("db.json")));
        store.insert(record(json!({"v": 1})), None);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let handle = store
            .save_async_with(move |result| {
                tx.send(result.is_ok()).unwrap();
            })
            .unwrap();
        handle.join().unwrap();
        assert!(rx.recv().unwrap());

        let reopened = Store::open(StoreConfig::file(dir.path().join("db.json")));
        assert_eq!(reopened.len(), 1);
    }
}
