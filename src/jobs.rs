//! Job application records as the cache sees them.
//!
//! The CRUD layer owns the shape of a record. The cache only relies on a
//! stable identifier and a company name; everything else is carried through
//! untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Identifier assigned by the remote service (numeric or opaque string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
  Number(i64),
  Text(String),
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      JobId::Number(n) => write!(f, "{}", n),
      JobId::Text(s) => f.write_str(s),
    }
  }
}

impl From<i64> for JobId {
  fn from(n: i64) -> Self {
    JobId::Number(n)
  }
}

impl From<&str> for JobId {
  fn from(s: &str) -> Self {
    JobId::Text(s.to_string())
  }
}

/// A single job application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
  pub id: JobId,
  pub company: String,
  /// Every other field, passed through verbatim
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl JobRecord {
  pub fn new(id: impl Into<JobId>, company: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      company: company.into(),
      fields: Map::new(),
    }
  }

  /// Attach a pass-through field.
  pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.fields.insert(name.to_string(), value.into());
    self
  }

  /// Display helper for list output.
  pub fn field_str(&self, name: &str) -> Option<&str> {
    self.fields.get(name).and_then(Value::as_str)
  }
}

/// A change committed against the remote service by the CRUD layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  Created(JobRecord),
  Updated(JobRecord),
  Deleted(JobId),
}

impl Mutation {
  /// Apply this mutation to a collection, producing the reconciled collection.
  ///
  /// Creates are prepended (most recent first). An update for an unknown id
  /// behaves like a create, a delete for an unknown id is a no-op.
  pub fn apply(&self, jobs: &[JobRecord]) -> Vec<JobRecord> {
    match self {
      Mutation::Created(record) => {
        let mut next = Vec::with_capacity(jobs.len() + 1);
        next.push(record.clone());
        next.extend(jobs.iter().filter(|j| j.id != record.id).cloned());
        next
      }
      Mutation::Updated(record) => {
        if jobs.iter().any(|j| j.id == record.id) {
          jobs
            .iter()
            .map(|j| {
              if j.id == record.id {
                record.clone()
              } else {
                j.clone()
              }
            })
            .collect()
        } else {
          Mutation::Created(record.clone()).apply(jobs)
        }
      }
      Mutation::Deleted(id) => jobs.iter().filter(|j| &j.id != id).cloned().collect(),
    }
  }

  /// Company touched by this mutation, if any.
  pub fn company(&self) -> Option<&str> {
    match self {
      Mutation::Created(r) | Mutation::Updated(r) => Some(&r.company),
      Mutation::Deleted(_) => None,
    }
  }
}

/// Distinct company names in collection order (first spelling wins).
pub fn distinct_companies(jobs: &[JobRecord]) -> Vec<String> {
  let mut seen = HashSet::new();
  jobs
    .iter()
    .filter(|j| seen.insert(j.company.as_str()))
    .map(|j| j.company.clone())
    .collect()
}
