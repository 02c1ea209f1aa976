//! Seams between the caches and the remote service.

use async_trait::async_trait;
use std::collections::HashMap;

use super::error::ApiError;
use crate::jobs::JobRecord;

/// Result of probing the single-logo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoProbe {
  /// Logo exists at this URL
  Found { url: String },
  NotFound,
}

/// Source of the full job collection.
#[async_trait]
pub trait JobsRemote: Send + Sync {
  async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ApiError>;
}

/// Source of company logos.
#[async_trait]
pub trait LogoRemote: Send + Sync {
  /// Check whether a logo exists for one company.
  async fn probe(&self, company: &str) -> Result<LogoProbe, ApiError>;

  /// Resolve several companies in one call. Keys are company names as the
  /// service echoes them; a `None` value means "no logo".
  async fn resolve_batch(
    &self,
    companies: &[String],
  ) -> Result<HashMap<String, Option<String>>, ApiError>;
}
