//! JSON snapshot persistence.
//!
//! A snapshot is one UTF-8 JSON object per store:
//!
//! ```text
//! { "next_id": 6, "records": { "1": { ... } }, "sort": { "score": ["2", "1"] } }
//! ```
//!
//! Older files naming the counter `auid` and the records `hash` still load.
//! Snapshots are written to `<path>.tmp`, fsynced, then renamed over the
//! target so a crash mid-write leaves the previous snapshot intact.

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::records::{RecordTable, SortIndexes, FIRST_ID};
use crate::types::{Key, Record};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix of the temporary file used during writes.
const TMP_SUFFIX: &str = ".tmp";

fn first_id() -> u64 {
    FIRST_ID
}

/// On-disk layout, read side.
#[derive(Deserialize)]
struct SnapshotFile {
    #[serde(default = "first_id", alias = "auid")]
    next_id: u64,

    #[serde(default, alias = "hash")]
    records: BTreeMap<Key, Record>,

    #[serde(default)]
    sort: BTreeMap<String, Vec<Key>>,
}

/// On-disk layout, write side. Borrows so encoding does not copy records.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    next_id: u64,
    records: &'a BTreeMap<Key, Record>,
    sort: &'a BTreeMap<String, Vec<Key>>,
}

/// Outcome of loading a snapshot path.
#[derive(Debug)]
pub enum Loaded {
    /// The file existed and parsed.
    Existing(Database),
    /// The file did not exist; an empty snapshot was written there.
    Created(Database),
}

impl Loaded {
    pub fn into_database(self) -> Database {
        match self {
            Loaded::Existing(db) | Loaded::Created(db) => db,
        }
    }
}

/// Serialize a database.
pub fn encode(db: &Database) -> Result<Vec<u8>> {
    let snapshot = SnapshotRef {
        next_id: db.table.next_id(),
        records: db.table.records(),
        sort: db.indexes.as_map(),
    };
    Ok(serde_json::to_vec(&snapshot)?)
}

/// Parse a snapshot. `path` is only used for error context.
pub fn decode(bytes: &[u8], path: &Path) -> Result<Database> {
    let file: SnapshotFile =
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(Database::from_parts(
        RecordTable::from_parts(file.next_id, file.records),
        SortIndexes::from_parts(file.sort),
    ))
}

/// Load the snapshot at `path`, creating an empty one if it is missing.
pub fn load(path: &Path) -> Result<Loaded> {
    match fs::read(path) {
        Ok(bytes) => decode(&bytes, path).map(Loaded::Existing),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let db = Database::new();
            write_file(path, &encode(&db)?)?;
            tracing::info!(path = %path.display(), "created empty snapshot");
            Ok(Loaded::Created(db))
        }
        Err(e) => Err(e.into()),
    }
}

/// Write `bytes` to `path` via a temporary file and rename.
///
/// Falls back to truncating and writing the target in place when the
/// rename fails (e.g. the target is held open on Windows).
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = tmp_path(path);

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if fs::rename(&tmp_path, path).is_err() {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        let _ = fs::remove_file(&tmp_path);
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(TMP_SUFFIX);
    PathBuf::from(tmp)
}

/// Serializes snapshot writes for one path and drops stale ones.
///
/// Every encoded snapshot carries the generation it was taken at. A
/// background write that finishes after a newer snapshot reached disk is
/// skipped rather than rolling the file back.
#[derive(Debug, Default)]
pub struct SnapshotWriter {
    written: Mutex<u64>,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the newest snapshot on disk (0 if none written yet).
    pub fn written_generation(&self) -> u64 {
        *self.written.lock()
    }

    /// Write a snapshot taken at `generation`.
    ///
    /// Returns false if a snapshot at the same or a newer generation was
    /// already written.
    pub fn write(&self, path: &Path, generation: u64, bytes: &[u8]) -> Result<bool> {
        let mut written = self.written.lock();
        if generation <= *written {
            tracing::debug!(generation, newest = *written, "skipping stale snapshot");
            return Ok(false);
        }
        write_file(path, bytes)?;
        *written = generation;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::into_record;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        let loaded = load(&path).unwrap();
        assert!(matches!(loaded, Loaded::Created(_)));
        assert!(path.exists());

        let reloaded = load(&path).unwrap();
        assert!(matches!(reloaded, Loaded::Existing(ref db) if db.is_empty()));
        assert_eq!(reloaded.into_database().table().next_id(), 1);
    }

    #[test]
    fn test_encode_uses_documented_field_names() {
        let mut db = Database::new();
        db.insert(into_record(json!({"score": 3})).unwrap(), None);
        db.track("score");

        let value: serde_json::Value = serde_json::from_slice(&encode(&db).unwrap()).unwrap();
        assert_eq!(value["next_id"], 2);
        assert_eq!(value["records"]["1"]["score"], 3);
        assert_eq!(value["sort"]["score"], json!(["1"]));
    }

    #[test]
    fn test_decode_legacy_names_and_defaults() {
        let path = Path::new("legacy.json");
        let db = decode(br#"{"auid": 4, "hash": {"3": {"a": 1}}}"#, path).unwrap();
        assert_eq!(db.table().next_id(), 4);
        assert_eq!(db.len(), 1);
        assert!(db.indexes().is_empty());

        let empty = decode(b"{}", path).unwrap();
        assert_eq!(empty, Database::new());
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result = decode(b"not json", Path::new("bad.json"));
        assert!(matches!(result, Err(StoreError::Deserialization { .. })));
    }

    #[test]
    fn test_write_file_leaves_no_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        write_file(&path, b"{}").unwrap();
        write_file(&path, b"{\"next_id\": 2}").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{\"next_id\": 2}");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_writer_skips_stale_generation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let writer = SnapshotWriter::new();

        assert!(writer.write(&path, 2, b"{\"next_id\": 9}").unwrap());
        assert!(!writer.write(&path, 1, b"{}").unwrap());
        assert_eq!(writer.written_generation(), 2);
        assert_eq!(fs::read(&path).unwrap(), b"{\"next_id\": 9}");
    }
}
