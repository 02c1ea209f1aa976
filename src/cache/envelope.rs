//! The persisted unit of the job collection cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::JobRecord;

/// Version tag for the envelope layout. Bump whenever `JobRecord` or the
/// envelope changes shape so old payloads are dropped instead of misread.
pub const CACHE_SCHEMA_VERSION: &str = "jobs-v1";

/// Storage key holding the serialized envelope.
pub const ENVELOPE_KEY: &str = "jobs.envelope";
/// Storage key holding the schema-version tag.
pub const SCHEMA_VERSION_KEY: &str = "jobs.schema_version";
/// Storage key holding the capture time (RFC 3339).
pub const CAPTURED_AT_KEY: &str = "jobs.captured_at";

/// All keys owned by the job collection cache.
pub const ALL_KEYS: [&str; 3] = [ENVELOPE_KEY, SCHEMA_VERSION_KEY, CAPTURED_AT_KEY];

/// Versioned, timestamped container around the cached job collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope {
  pub items: Vec<JobRecord>,
  pub captured_at: DateTime<Utc>,
  pub schema_version: String,
}

impl CacheEnvelope {
  pub fn new(items: Vec<JobRecord>, captured_at: DateTime<Utc>) -> Self {
    Self {
      items,
      captured_at,
      schema_version: CACHE_SCHEMA_VERSION.to_string(),
    }
  }
}

/// Why an envelope (or its bookkeeping) was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
  /// Written by a different schema version
  VersionMismatch,
  /// Older than the TTL
  Expired,
  /// Captured in the future relative to the clock
  FromFuture,
}

/// Validity check shared by the full read and the boolean predicate.
pub fn check(
  schema_version: &str,
  captured_at: DateTime<Utc>,
  now: DateTime<Utc>,
  ttl: Duration,
) -> Result<(), Staleness> {
  if schema_version != CACHE_SCHEMA_VERSION {
    return Err(Staleness::VersionMismatch);
  }
  let age = now - captured_at;
  if age < Duration::zero() {
    return Err(Staleness::FromFuture);
  }
  if age >= ttl {
    return Err(Staleness::Expired);
  }
  Ok(())
}
