//! Session store implementation.

use crate::store::Store;
use crate::types::{Record, Timestamp};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Field holding the last-write time of a session, in milliseconds.
pub const EXPIRE_FIELD: &str = "_expire";

/// Default session lifetime: 30 minutes.
const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default number of reads between expiry sweeps.
const DEFAULT_SWEEP_EVERY: u64 = 10;

/// Session configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// How long a session lives after its last write.
    pub ttl: Duration,

    /// Sweep all expired sessions on every n-th read. 0 disables sweeping.
    pub sweep_every: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }
}

type Clock = Box<dyn Fn() -> Timestamp + Send + Sync>;

/// Sessions on a non-persisted [`Store`].
pub struct SessionStore {
    store: Store,
    config: SessionConfig,
    clock: Clock,
    /// Reads since creation, for sweep scheduling.
    reads: AtomicU64,
    /// Ids issued, mixed into new ids.
    issued: AtomicU64,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Timestamp::now)
    }

    /// Create a session store reading time from `clock`.
    pub fn with_clock(
        config: SessionConfig,
        clock: impl Fn() -> Timestamp + Send + Sync + 'static,
    ) -> Self {
        Self {
            store: Store::in_memory(),
            config,
            clock: Box::new(clock),
            reads: AtomicU64::new(0),
            issued: AtomicU64::new(0),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Number of stored sessions, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn ttl_millis(&self) -> i64 {
        self.config.ttl.as_millis() as i64
    }

    /// Milliseconds since the session was last written. `None` if unstamped.
    fn age(session: &Record, now: Timestamp) -> Option<i64> {
        session
            .get(EXPIRE_FIELD)
            .and_then(Value::as_i64)
            .map(|touched| now.0.saturating_sub(touched))
    }

    /// Reads and writes stop accepting a session once its age reaches the ttl.
    fn is_live(&self, session: &Record, now: Timestamp) -> bool {
        Self::age(session, now).map_or(false, |age| age < self.ttl_millis())
    }

    /// Sweeps only remove sessions strictly older than the ttl.
    fn is_stale(&self, session: &Record, now: Timestamp) -> bool {
        Self::age(session, now).map_or(true, |age| age > self.ttl_millis())
    }

    /// Read one field of a live session.
    ///
    /// An expired session is deleted and reads as absent.
    pub fn get(&self, sid: &str, field: &str) -> Option<Value> {
        let now = (self.clock)();

        let reads = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        if self.config.sweep_every > 0 && reads % self.config.sweep_every == 0 {
            self.sweep_at(now);
        }

        let session = self.store.find_by_key(sid)?;
        if !self.is_live(&session, now) {
            self.store.delete_by_key(sid);
            return None;
        }
        session.get(field).cloned()
    }

    /// Write one field, touching the session.
    ///
    /// When `sid` names no live session a new one is created. The returned id
    /// is the one the caller should hand back to the client.
    pub fn set(&self, sid: Option<&str>, field: &str, value: Value) -> String {
        let now = (self.clock)();

        if let Some(sid) = sid {
            if let Some(session) = self.store.find_by_key(sid) {
                if self.is_live(&session, now) {
                    let mut fields = Record::new();
                    fields.insert(field.to_string(), value);
                    fields.insert(EXPIRE_FIELD.to_string(), Value::from(now.0));
                    self.store.update_by_key(sid, &fields);
                    return sid.to_string();
                }
                self.store.delete_by_key(sid);
            }
        }

        let mut session = Record::new();
        session.insert(field.to_string(), value);
        session.insert(EXPIRE_FIELD.to_string(), Value::from(now.0));

        loop {
            let sid = self.generate_id(now);
            if self.store.insert(session.clone(), Some(&sid)).is_some() {
                tracing::debug!(sessions = self.store.len(), "created session");
                return sid;
            }
        }
    }

    /// Delete a session. Returns false if it did not exist.
    pub fn destroy(&self, sid: &str) -> bool {
        self.store.delete_by_key(sid)
    }

    /// Delete every expired session, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_at((self.clock)())
    }

    fn sweep_at(&self, now: Timestamp) -> usize {
        let expired: Vec<String> = self.store.with_database(|db| {
            db.table()
                .iter()
                .filter(|(_, session)| self.is_stale(session, now))
                .map(|(key, _)| key.to_string())
                .collect()
        });

        let removed = expired
            .iter()
            .filter(|sid| self.store.delete_by_key(sid))
            .count();
        if removed > 0 {
            tracing::debug!(removed, "swept expired sessions");
        }
        removed
    }

    /// Hex SHA-256 over fresh randomness, the time and an issue counter.
    fn generate_id(&self, now: Timestamp) -> String {
        let issued = self.issued.fetch_add(1, Ordering::Relaxed);
        let nonce: [u8; 16] = rand::random();

        let mut hasher = Sha256::new();
        hasher.update(nonce);
        hasher.update(now.0.to_le_bytes());
        hasher.update(issued.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
