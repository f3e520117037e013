//! # tallydb
//!
//! An embedded record store for small web applications: JSON records keyed
//! by string, ordered views over any numeric field, and whole-store JSON
//! snapshots written in the background.
//!
//! ## Core Concepts
//!
//! - **Records**: open JSON objects stored under a unique key
//! - **Sort indices**: per-field key orderings, rebuilt on every mutation
//!   that could move a key
//! - **Queries**: a filter closure, one sort field and a signed
//!   `(start, count)` window
//! - **Snapshots**: the full store as one JSON file, flushed periodically
//!   for stores marked dirty
//! - **Sessions** and **templates**: the two collaborators built on top
//!
//! ## Example
//!
//! ```ignore
//! use tallydb::{into_record, FlushScheduler, Query, Store, StoreConfig};
//!
//! let posts = Arc::new(Store::open(StoreConfig::file("posts.json").sort_field("time")));
//!
//! posts.insert(into_record(json!({"title": "hello", "time": 1}))?, None);
//!
//! // Newest ten posts.
//! let latest = posts.find(&Query::new().order_by("time").limit(1, -10));
//!
//! // Persist dirty stores every five seconds.
//! let _flusher = FlushScheduler::start(Duration::from_secs(5), vec![posts.clone()]);
//! ```

pub mod database;
pub mod error;
pub mod flush;
pub mod query;
pub mod records;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod template;
pub mod types;

// Re-exports
pub use database::{Database, KeyUpdateRefresh};
pub use error::{Result, StoreError};
pub use flush::{flush_dirty, FlushScheduler};
pub use query::{Limit, Query};
pub use records::{RecordTable, SortIndexes};
pub use session::{SessionConfig, SessionStore};
pub use store::{Store, StoreConfig};
pub use template::{Template, TemplateCache, TemplateConfig, TemplateError};
pub use types::*;
