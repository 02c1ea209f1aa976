//! Serde types matching remote service payloads, and the validation step
//! that turns them into domain values.
//!
//! Nothing loosely typed gets past this module: a record without an id or a
//! company is dropped, a batch entry that isn't a usable URL counts as absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::jobs::JobRecord;

// ============================================================================
// Job collection endpoint
// ============================================================================

/// `GET /jobs-collection` body: a bare array, or wrapped in `{"jobs": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiJobsResponse {
  List(Vec<Value>),
  Wrapped { jobs: Vec<Value> },
}

impl ApiJobsResponse {
  /// Validate every record, dropping the ones that don't carry an id and a
  /// non-blank company.
  pub fn into_records(self) -> Vec<JobRecord> {
    let raw = match self {
      ApiJobsResponse::List(items) | ApiJobsResponse::Wrapped { jobs: items } => items,
    };

    raw
      .into_iter()
      .enumerate()
      .filter_map(|(position, value)| match serde_json::from_value::<JobRecord>(value) {
        Ok(record) if !record.company.trim().is_empty() => Some(record),
        Ok(record) => {
          warn!(id = %record.id, "Dropping job record with blank company");
          None
        }
        Err(e) => {
          warn!(position, "Dropping malformed job record: {}", e);
          None
        }
      })
      .collect()
  }
}

// ============================================================================
// Batch logo endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiLogoBatchRequest<'a> {
  pub companies: &'a [String],
}

/// `POST /logo/batch` body: `company -> url | null`, optionally wrapped in
/// `{"logos": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiLogoBatchResponse {
  Wrapped { logos: HashMap<String, Value> },
  Map(HashMap<String, Value>),
}

impl ApiLogoBatchResponse {
  pub fn into_map(self) -> HashMap<String, Option<String>> {
    let raw = match self {
      ApiLogoBatchResponse::Wrapped { logos } | ApiLogoBatchResponse::Map(logos) => logos,
    };

    raw
      .into_iter()
      .map(|(company, value)| {
        let url = match value {
          Value::String(url) if is_usable_url(&url) => Some(url),
          Value::Object(mut obj) => match obj.remove("url") {
            Some(Value::String(url)) if is_usable_url(&url) => Some(url),
            _ => None,
          },
          _ => None,
        };
        (company, url)
      })
      .collect()
  }
}

fn is_usable_url(candidate: &str) -> bool {
  let candidate = candidate.trim();
  !candidate.is_empty()
    && (candidate.starts_with("http://")
      || candidate.starts_with("https://")
      || candidate.starts_with("data:")
      || candidate.starts_with('/'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::jobs::JobId;

  #[test]
  fn test_jobs_bare_array() {
    let body = r#"[{"id":1,"company":"Acme","role":"SRE"}]"#;
    let records = serde_json::from_str::<ApiJobsResponse>(body)
      .unwrap()
      .into_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, JobId::Number(1));
    assert_eq!(records[0].field_str("role"), Some("SRE"));
  }

  #[test]
  fn test_jobs_wrapped_and_malformed_entries_dropped() {
    let body = r#"{"jobs":[
      {"id":1,"company":"Acme"},
      {"company":"NoId"},
      {"id":3,"company":"   "},
      "garbage",
      {"id":"x5","company":"Globex"}
    ]}"#;
    let records = serde_json::from_str::<ApiJobsResponse>(body)
      .unwrap()
      .into_records();
    let companies: Vec<_> = records.iter().map(|r| r.company.as_str()).collect();
    assert_eq!(companies, vec!["Acme", "Globex"]);
  }

  #[test]
  fn test_jobs_non_collection_rejected() {
    assert!(serde_json::from_str::<ApiJobsResponse>(r#"{"error":"nope"}"#).is_err());
  }

  #[test]
  fn test_logo_batch_validation() {
    let body = r#"{
      "Acme": "https://cdn.example.com/acme.png",
      "Globex": null,
      "Initech": "",
      "Hooli": 42,
      "Umbrella": {"url": "/logo/umbrella"}
    }"#;
    let map = serde_json::from_str::<ApiLogoBatchResponse>(body)
      .unwrap()
      .into_map();
    assert_eq!(
      map["Acme"].as_deref(),
      Some("https://cdn.example.com/acme.png")
    );
    assert_eq!(map["Globex"], None);
    assert_eq!(map["Initech"], None);
    assert_eq!(map["Hooli"], None);
    assert_eq!(map["Umbrella"].as_deref(), Some("/logo/umbrella"));
  }

  #[test]
  fn test_logo_batch_wrapped() {
    let body = r#"{"logos":{"Acme":"https://x/acme.png"}}"#;
    let map = serde_json::from_str::<ApiLogoBatchResponse>(body)
      .unwrap()
      .into_map();
    assert_eq!(map.len(), 1);
    assert!(map["Acme"].is_some());
  }
}
