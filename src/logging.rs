use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "jobtrack=info";

/// Log directory (default: $XDG_DATA_HOME/jobtrack/logs)
pub fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir().ok_or_else(|| eyre!("Could not determine data directory"))?;
  Ok(data_dir.join("jobtrack").join("logs"))
}

/// Daily rolling file writer in `dir`, created if missing.
fn file_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard)> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let appender = tracing_appender::rolling::RollingFileAppender::builder()
    .rotation(tracing_appender::rolling::Rotation::DAILY)
    .filename_prefix("jobtrack.log")
    .build(dir)
    .map_err(|e| eyre!("Failed to open log file in {}: {}", dir.display(), e))?;
  Ok(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber.
///
/// Writes to a daily rolling file; `verbose` adds a stderr layer. If the log
/// directory can't be used, logs go to stderr instead and a warning is
/// emitted. `RUST_LOG` overrides the default filter. Keep the returned guard
/// alive until exit or buffered lines are lost.
pub fn init(verbose: bool) -> Result<Option<WorkerGuard>> {
  let file = default_log_dir().and_then(|dir| file_writer(&dir));

  let (file_layer, guard, file_error) = match file {
    Ok((writer, guard)) => (
      Some(fmt::layer().with_writer(writer).with_ansi(false).boxed()),
      Some(guard),
      None,
    ),
    Err(e) => (None, None, Some(e)),
  };
  let stderr = (verbose || file_error.is_some())
    .then(|| fmt::layer().with_writer(std::io::stderr).boxed());

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
    .with(file_layer)
    .with(stderr)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  if let Some(e) = file_error {
    warn!("File logging unavailable, logging to stderr: {}", e);
  }
  Ok(guard)
}
