mod commands;

use clap::Parser;
use color_eyre::Result;
use jobtrack::api::ApiClient;
use jobtrack::cache::{JobCollectionCache, KeyValueStore, NoopStore, SqliteStore};
use jobtrack::config::{CacheConfig, Config};
use jobtrack::logos::LogoResolutionService;
use jobtrack::sync::{SyncOrchestrator, SyncSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "jobtrack")]
#[command(about = "Job application tracker with a local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/jobtrack/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Tracker service base URL
  #[arg(long, global = true)]
  base_url: Option<String>,

  /// Don't persist the job collection for this run
  #[arg(long, global = true)]
  no_cache: bool,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = jobtrack::logging::init(args.verbose)?;

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }
  if args.no_cache {
    config.cache.enabled = false;
  }
  config.validate()?;

  let client = Arc::new(ApiClient::new(&config.api)?);
  let cache = Arc::new(JobCollectionCache::new(open_store(&config.cache)).with_ttl(config.cache.ttl()));
  let logos = LogoResolutionService::new(client.clone());
  let settings = SyncSettings {
    check_interval: config.cache.staleness_check_interval(),
    preload_logos: config.logos.preload,
  };
  let (sync, events) = SyncOrchestrator::new(client, cache, logos, settings);

  info!(command = ?args.command, "Starting");
  commands::run(args.command, &sync, events).await
}

/// Open the persistent store, degrading to no persistence if it can't be used.
fn open_store(config: &CacheConfig) -> Arc<dyn KeyValueStore> {
  if !config.enabled {
    return Arc::new(NoopStore);
  }

  let opened = match &config.path {
    Some(path) => SqliteStore::open_at(path),
    None => SqliteStore::open(),
  };
  match opened {
    Ok(store) => Arc::new(store),
    Err(e) => {
      warn!("Job cache unavailable, continuing without persistence: {}", e);
      Arc::new(NoopStore)
    }
  }
}
