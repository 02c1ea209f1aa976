//! Persistent caching of the job collection.
//!
//! This module provides:
//! - A small key/value storage abstraction (SQLite, in-memory, no-op)
//! - A versioned, TTL-bounded envelope around the full job collection
//! - Purge-on-sight for anything expired, foreign or corrupt
//! - Graceful degradation: storage faults behave like an empty cache

mod clock;
mod collection;
mod envelope;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{CacheStatus, JobCollectionCache, DEFAULT_TTL_SECS};
pub use envelope::{CacheEnvelope, CACHE_SCHEMA_VERSION};
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
