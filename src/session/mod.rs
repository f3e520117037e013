//! Session records kept on a dedicated in-memory store.
//!
//! Each session is one record keyed by its session id. The record carries
//! an `_expire` field with the time of its last write; a session is gone once
//! that is more than the configured TTL in the past.
//!
//! # Example
//!
//! ```ignore
//! let sessions = SessionStore::new(SessionConfig::default());
//!
//! // No cookie yet: a new session is created and its id returned.
//! let sid = sessions.set(None, "user", json!("ada"));
//!
//! assert_eq!(sessions.get(&sid, "user"), Some(json!("ada")));
//! sessions.destroy(&sid);
//! ```

mod manager;

pub use manager::{SessionConfig, SessionStore, EXPIRE_FIELD};
