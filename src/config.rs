use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_TTL_SECS;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logos: LogosConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Tracker service root, e.g. `https://tracker.example.com/api`
  #[serde(default)]
  pub base_url: String,
  /// Per-request timeout; a timed-out logo lookup falls back like any failure
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: String::new(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Persist the job collection between runs
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database path (default: $XDG_DATA_HOME/jobtrack/cache.db)
  pub path: Option<PathBuf>,
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
  /// How often the tracker checks whether its collection went stale
  #[serde(default = "default_staleness_check_secs")]
  pub staleness_check_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      ttl_secs: default_ttl_secs(),
      staleness_check_secs: default_staleness_check_secs(),
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    i64::try_from(self.ttl_secs)
      .ok()
      .and_then(Duration::try_seconds)
      .unwrap_or_else(|| Duration::seconds(DEFAULT_TTL_SECS))
  }

  pub fn staleness_check_interval(&self) -> std::time::Duration {
    std::time::Duration::from_secs(self.staleness_check_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogosConfig {
  /// Warm the logo cache after every collection refresh
  #[serde(default = "default_true")]
  pub preload: bool,
}

impl Default for LogosConfig {
  fn default() -> Self {
    Self { preload: true }
  }
}

fn default_true() -> bool {
  true
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_ttl_secs() -> u64 {
  DEFAULT_TTL_SECS as u64
}

fn default_staleness_check_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jobtrack.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jobtrack/config.yaml
  ///
  /// With no file at all, defaults are used; the base URL must then come
  /// from the command line.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("jobtrack.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jobtrack").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Check settings that have no usable default.
  pub fn validate(&self) -> Result<()> {
    if self.api.base_url.trim().is_empty() {
      return Err(eyre!(
        "No API base URL configured. Set api.base_url in ~/.config/jobtrack/config.yaml \
         or pass --base-url."
      ));
    }
    Ok(())
  }

  /// Get the API token from the environment, if set.
  ///
  /// Checks JOBTRACK_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("JOBTRACK_API_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_when_sections_missing() {
    let config = Config::from_yaml("api:\n  base_url: http://localhost:8080\n").unwrap();
    assert_eq!(config.api.timeout_secs, 10);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.ttl(), Duration::minutes(5));
    assert!(config.logos.preload);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  base_url: https://tracker.example.com/api
  timeout_secs: 3
cache:
  enabled: false
  path: /tmp/jobtrack.db
  ttl_secs: 60
  staleness_check_secs: 5
logos:
  preload: false
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.api.timeout_secs, 3);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/jobtrack.db")));
    assert_eq!(config.cache.ttl(), Duration::seconds(60));
    assert_eq!(
      config.cache.staleness_check_interval(),
      std::time::Duration::from_secs(5)
    );
    assert!(!config.logos.preload);
  }

  #[test]
  fn test_out_of_range_ttl_uses_default() {
    let config = Config::from_yaml("cache:\n  ttl_secs: 100000000000000000\n").unwrap();
    assert_eq!(config.cache.ttl(), Duration::seconds(DEFAULT_TTL_SECS));

    let config = Config::from_yaml("cache:\n  ttl_secs: 18446744073709551615\n").unwrap();
    assert_eq!(config.cache.ttl(), Duration::seconds(DEFAULT_TTL_SECS));
  }

  #[test]
  fn test_missing_base_url_fails_validation() {
    assert!(Config::default().validate().is_err());
  }

  #[test]
  fn test_explicit_missing_file_is_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
