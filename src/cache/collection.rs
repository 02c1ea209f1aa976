//! Versioned, TTL-bounded persistent cache of the job collection.

use chrono::{DateTime, Duration, Utc};
use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::envelope::{
  self, CacheEnvelope, Staleness, ALL_KEYS, CACHE_SCHEMA_VERSION, CAPTURED_AT_KEY, ENVELOPE_KEY,
  SCHEMA_VERSION_KEY,
};
use super::storage::KeyValueStore;
use crate::jobs::JobRecord;

/// Default time-to-live for a captured collection, in seconds.
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Snapshot of what the cache currently holds, for status display.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatus {
  /// Whether any envelope is stored (valid or not)
  pub present: bool,
  pub valid: bool,
  pub age: Option<Duration>,
  pub item_count: Option<usize>,
}

/// Cache of the user's full job collection.
///
/// The stored envelope is only ever handed out while it is valid: current
/// schema version and younger than the TTL. Anything else found in storage
/// (expired, foreign version, unparsable) is deleted on sight. Storage faults
/// never escape; they behave like an empty cache.
pub struct JobCollectionCache {
  store: Arc<dyn KeyValueStore>,
  clock: Arc<dyn Clock>,
  /// How long before a captured collection is considered stale
  ttl: Duration,
}

impl JobCollectionCache {
  /// Create a cache over the given store using wall-clock time.
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      store,
      clock: Arc::new(SystemClock),
      ttl: Duration::seconds(DEFAULT_TTL_SECS),
    }
  }

  /// Set the TTL for captured collections.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  /// Replace the time source.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  /// Return the stored envelope if it is still valid.
  pub fn read(&self) -> Option<CacheEnvelope> {
    let bytes = match self.store.get(ENVELOPE_KEY) {
      Ok(Some(bytes)) => bytes,
      Ok(None) => return None,
      Err(e) => {
        warn!("Job cache unavailable, treating as empty: {}", e);
        return None;
      }
    };

    // Bookkeeping is checked on every read, independently of the payload.
    let (tag, captured_at) = match self.read_meta() {
      Ok(meta) => meta,
      Err(e) => {
        warn!("Job cache unavailable, treating as empty: {}", e);
        return None;
      }
    };
    if !matches!(&tag, Meta::Present(tag) if tag == CACHE_SCHEMA_VERSION) {
      debug!(?tag, "Job cache schema tag mismatch");
      self.purge("schema tag mismatch");
      return None;
    }
    let Meta::Present(captured_at) = captured_at else {
      self.purge("missing or corrupt capture time");
      return None;
    };

    let envelope: CacheEnvelope = match serde_json::from_slice(&bytes) {
      Ok(envelope) => envelope,
      Err(e) => {
        warn!("Discarding corrupt job cache envelope: {}", e);
        self.purge("corrupt envelope");
        return None;
      }
    };

    if envelope.captured_at != captured_at {
      self.purge("capture time mismatch");
      return None;
    }

    match envelope::check(
      &envelope.schema_version,
      envelope.captured_at,
      self.clock.now(),
      self.ttl,
    ) {
      Ok(()) => Some(envelope),
      Err(reason) => {
        self.purge(describe(reason));
        None
      }
    }
  }

  /// Persist a new envelope, replacing whatever was there.
  pub fn write(&self, items: &[JobRecord]) {
    let envelope = CacheEnvelope {
      items: items.to_vec(),
      captured_at: self.clock.now(),
      schema_version: CACHE_SCHEMA_VERSION.to_string(),
    };

    let payload = match serde_json::to_vec(&envelope) {
      Ok(payload) => payload,
      Err(e) => {
        warn!("Failed to serialize job cache envelope: {}", e);
        return;
      }
    };

    let result = self.store.put_many(&[
      (ENVELOPE_KEY, payload),
      (SCHEMA_VERSION_KEY, CACHE_SCHEMA_VERSION.as_bytes().to_vec()),
      (
        CAPTURED_AT_KEY,
        envelope.captured_at.to_rfc3339().into_bytes(),
      ),
    ]);

    match result {
      Ok(()) => debug!(count = items.len(), "Job cache written"),
      Err(e) => {
        warn!("Failed to persist job cache, continuing without it: {}", e);
        // A half-written envelope must not survive to the next read.
        self.purge("failed write");
      }
    }
  }

  /// Delete the envelope and its bookkeeping.
  pub fn invalidate(&self) {
    if let Err(e) = self.store.remove(&ALL_KEYS) {
      warn!("Failed to clear job cache: {}", e);
    }
  }

  /// Time since the stored collection was captured. Display only.
  pub fn age(&self) -> Option<Duration> {
    match self.read_captured_at() {
      Ok(Meta::Present(captured_at)) => Some(self.clock.now() - captured_at),
      _ => None,
    }
  }

  /// Same validity predicate as [`read`](Self::read), without loading the
  /// payload. Invalid state is purged here too.
  pub fn is_valid(&self) -> bool {
    match self.read_meta() {
      Ok((Meta::Present(tag), Meta::Present(captured_at))) => {
        match envelope::check(&tag, captured_at, self.clock.now(), self.ttl) {
          Ok(()) => matches!(self.store.get(ENVELOPE_KEY), Ok(Some(_))),
          Err(reason) => {
            self.purge(describe(reason));
            false
          }
        }
      }
      Ok((Meta::Absent, Meta::Absent)) => {
        if matches!(self.store.get(ENVELOPE_KEY), Ok(Some(_))) {
          self.purge("missing bookkeeping");
        }
        false
      }
      Ok(_) => {
        self.purge("incomplete or corrupt bookkeeping");
        false
      }
      Err(e) => {
        warn!("Job cache unavailable, treating as empty: {}", e);
        false
      }
    }
  }

  /// Describe the cache for status output. Reads the payload only to count it.
  pub fn status(&self) -> CacheStatus {
    let present = matches!(self.store.get(ENVELOPE_KEY), Ok(Some(_)));
    let age = self.age();
    let valid = self.is_valid();
    let item_count = if valid {
      self.read().map(|e| e.items.len())
    } else {
      None
    };
    CacheStatus {
      present,
      valid,
      age,
      item_count,
    }
  }

  /// Schema tag and capture time. `Err` only for store faults; values that
  /// don't parse come back as `Meta::Corrupt`.
  fn read_meta(&self) -> Result<(Meta<String>, Meta<DateTime<Utc>>)> {
    Ok((self.read_tag()?, self.read_captured_at()?))
  }

  fn read_tag(&self) -> Result<Meta<String>> {
    Ok(match self.store.get(SCHEMA_VERSION_KEY)? {
      None => Meta::Absent,
      Some(bytes) => match String::from_utf8(bytes) {
        Ok(tag) => Meta::Present(tag),
        Err(e) => {
          warn!("Invalid job cache schema tag: {}", e);
          Meta::Corrupt
        }
      },
    })
  }

  fn read_captured_at(&self) -> Result<Meta<DateTime<Utc>>> {
    let Some(bytes) = self.store.get(CAPTURED_AT_KEY)? else {
      return Ok(Meta::Absent);
    };
    let parsed = String::from_utf8(bytes)
      .map_err(|e| e.to_string())
      .and_then(|text| {
        DateTime::parse_from_rfc3339(&text)
          .map_err(|e| format!("failed to parse capture time '{}': {}", text, e))
      });
    Ok(match parsed {
      Ok(captured_at) => Meta::Present(captured_at.with_timezone(&Utc)),
      Err(reason) => {
        warn!("Invalid job cache capture time: {}", reason);
        Meta::Corrupt
      }
    })
  }

  fn purge(&self, reason: &str) {
    debug!(reason, "Purging job cache");
    self.invalidate();
  }
}

/// A stored bookkeeping value.
#[derive(Debug)]
enum Meta<T> {
  Absent,
  Present(T),
  Corrupt,
}

fn describe(reason: Staleness) -> &'static str {
  match reason {
    Staleness::VersionMismatch => "schema version mismatch",
    Staleness::Expired => "expired",
    Staleness::FromFuture => "captured in the future",
  }
}
