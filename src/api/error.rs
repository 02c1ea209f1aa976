/// Errors from the remote tracker service.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
  #[error("Resource not found: {0}")]
  NotFound(String),
  #[error("Unexpected status {status} from {endpoint}")]
  Status { endpoint: String, status: u16 },
  #[error("Request to {endpoint} failed: {source}")]
  Transport {
    endpoint: String,
    #[source]
    source: reqwest::Error,
  },
  #[error("Malformed response from {endpoint}: {reason}")]
  Malformed { endpoint: String, reason: String },
  #[error("Invalid endpoint URL: {0}")]
  Url(String),
}
