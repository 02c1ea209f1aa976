use async_trait::async_trait;
use reqwest::{header, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::error::ApiError;
use crate::api::remote::{JobsRemote, LogoProbe, LogoRemote};
use crate::api::wire::{ApiJobsResponse, ApiLogoBatchRequest, ApiLogoBatchResponse};
use crate::config::{ApiConfig, Config};
use crate::jobs::JobRecord;
use color_eyre::{eyre::eyre, Result};

/// Tracker service API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let mut headers = header::HeaderMap::new();
    if let Some(token) = Config::get_api_token() {
      let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      headers.insert(header::AUTHORIZATION, value);
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .default_headers(headers)
      .user_agent(concat!("jobtrack/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let base_url = parse_base_url(&config.base_url)?;

    Ok(Self { http, base_url })
  }

  fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
    join_endpoint(&self.base_url, segments)
  }

  fn transport(endpoint: &Url, source: reqwest::Error) -> ApiError {
    ApiError::Transport {
      endpoint: endpoint.to_string(),
      source,
    }
  }
}

/// Build `{base}/{segments...}` with each segment percent-encoded.
fn join_endpoint(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
  let mut url = base.clone();
  url
    .path_segments_mut()
    .map_err(|_| ApiError::Url(base.to_string()))?
    .pop_if_empty()
    .extend(segments);
  Ok(url)
}

/// Parse the configured base URL, keeping any path prefix (`https://host/api`).
fn parse_base_url(raw: &str) -> Result<Url> {
  let url = Url::parse(raw.trim()).map_err(|e| eyre!("Invalid API base URL '{}': {}", raw, e))?;
  if url.cannot_be_a_base() {
    return Err(eyre!("API base URL '{}' cannot have paths appended", raw));
  }
  Ok(url)
}

#[async_trait]
impl JobsRemote for ApiClient {
  /// Fetch the full job collection
  async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ApiError> {
    let endpoint = self.endpoint(&["jobs-collection"])?;

    let response = self
      .http
      .get(endpoint.clone())
      .send()
      .await
      .map_err(|e| Self::transport(&endpoint, e))?;

    match response.status() {
      status if status.is_success() => {}
      StatusCode::NOT_FOUND => return Err(ApiError::NotFound(endpoint.to_string())),
      status => {
        return Err(ApiError::Status {
          endpoint: endpoint.to_string(),
          status: status.as_u16(),
        })
      }
    }

    let body: ApiJobsResponse = response.json().await.map_err(|e| ApiError::Malformed {
      endpoint: endpoint.to_string(),
      reason: e.to_string(),
    })?;

    let records = body.into_records();
    debug!(count = records.len(), "Fetched job collection");
    Ok(records)
  }
}

#[async_trait]
impl LogoRemote for ApiClient {
  /// Existence probe against the single-logo endpoint
  async fn probe(&self, company: &str) -> Result<LogoProbe, ApiError> {
    let endpoint = self.endpoint(&["logo", company])?;

    let response = self
      .http
      .head(endpoint.clone())
      .send()
      .await
      .map_err(|e| Self::transport(&endpoint, e))?;

    match response.status() {
      status if status.is_success() => Ok(LogoProbe::Found {
        url: endpoint.to_string(),
      }),
      StatusCode::NOT_FOUND => Ok(LogoProbe::NotFound),
      status => Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
      }),
    }
  }

  /// Batched logo resolution
  async fn resolve_batch(
    &self,
    companies: &[String],
  ) -> Result<HashMap<String, Option<String>>, ApiError> {
    let endpoint = self.endpoint(&["logo", "batch"])?;

    let response = self
      .http
      .post(endpoint.clone())
      .json(&ApiLogoBatchRequest { companies })
      .send()
      .await
      .map_err(|e| Self::transport(&endpoint, e))?;

    if !response.status().is_success() {
      return Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: response.status().as_u16(),
      });
    }

    let body: ApiLogoBatchResponse = response.json().await.map_err(|e| ApiError::Malformed {
      endpoint: endpoint.to_string(),
      reason: e.to_string(),
    })?;

    Ok(body.into_map())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_keeps_prefix_and_encodes() {
    let base = parse_base_url("https://tracker.example.com/api/").unwrap();
    assert_eq!(
      join_endpoint(&base, &["logo", "AT&T Inc/US"]).unwrap().as_str(),
      "https://tracker.example.com/api/logo/AT&T%20Inc%2FUS"
    );
    assert_eq!(
      join_endpoint(&base, &["jobs-collection"]).unwrap().as_str(),
      "https://tracker.example.com/api/jobs-collection"
    );
  }

  #[test]
  fn test_endpoint_without_prefix() {
    let base = parse_base_url("http://localhost:8080").unwrap();
    assert_eq!(
      join_endpoint(&base, &["logo", "batch"]).unwrap().as_str(),
      "http://localhost:8080/logo/batch"
    );
  }

  #[test]
  fn test_rejects_non_base_url() {
    assert!(parse_base_url("mailto:someone@example.com").is_err());
    assert!(parse_base_url("not a url").is_err());
  }
}
