/// Subcommands and their handlers
use chrono::Duration;
use clap::Subcommand;
use color_eyre::Result;
use jobtrack::cache::CACHE_SCHEMA_VERSION;
use jobtrack::jobs::JobRecord;
use jobtrack::logos::LogoRef;
use jobtrack::sync::{SyncEvent, SyncEvents, SyncOrchestrator};
use tracing::info;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
  /// Show the tracked job applications (cached when fresh)
  #[command(alias = "ls")]
  List,
  /// Fetch the job collection from the service, ignoring the cache
  Refresh,
  /// Show the state of the local job cache
  Status,
  /// Keep the tracker active and print sync events until Ctrl-C
  Watch,
  /// Resolve company logos
  Logo {
    /// Company names
    #[arg(required = true)]
    companies: Vec<String>,
  },
  /// Drop the cached job collection
  Clear,
}

pub async fn run(command: Command, sync: &SyncOrchestrator, events: SyncEvents) -> Result<()> {
  match command {
    Command::List => list(sync).await,
    Command::Refresh => refresh(sync).await,
    Command::Status => {
      status(sync);
      Ok(())
    }
    Command::Watch => watch(sync, events).await,
    Command::Logo { companies } => {
      logo(sync, &companies).await;
      Ok(())
    }
    Command::Clear => {
      sync.cache().invalidate();
      println!("Job cache cleared");
      Ok(())
    }
  }
}

async fn list(sync: &SyncOrchestrator) -> Result<()> {
  let snapshot = sync.activate().await?;
  sync.deactivate();

  if snapshot.jobs.is_empty() {
    println!("No job applications");
    return Ok(());
  }
  for job in &snapshot.jobs {
    println!("{}", format_job(job));
  }
  println!("{} jobs ({:?})", snapshot.jobs.len(), snapshot.source);
  Ok(())
}

async fn refresh(sync: &SyncOrchestrator) -> Result<()> {
  let jobs = sync.refresh().await?;
  println!("Fetched {} jobs", jobs.len());
  Ok(())
}

fn status(sync: &SyncOrchestrator) {
  let cache = sync.cache();
  let status = cache.status();

  println!("Schema:  {}", CACHE_SCHEMA_VERSION);
  println!("TTL:     {}", format_age(cache.ttl()));
  println!("Present: {}", status.present);
  println!("Valid:   {}", status.valid);
  match status.age {
    Some(age) => println!("Age:     {}", format_age(age)),
    None => println!("Age:     -"),
  }
  match status.item_count {
    Some(count) => println!("Jobs:    {}", count),
    None => println!("Jobs:    -"),
  }
}

async fn watch(sync: &SyncOrchestrator, mut events: SyncEvents) -> Result<()> {
  // Render the events the activation emits below, including failures.
  if let Err(e) = sync.activate().await {
    info!("Initial load failed, staleness check will retry: {:#}", e);
  }

  loop {
    tokio::select! {
      event = events.next() => match event {
        Some(event) => println!("{}", describe_event(&event)),
        None => break,
      },
      _ = tokio::signal::ctrl_c() => break,
    }
  }

  sync.deactivate();
  Ok(())
}

async fn logo(sync: &SyncOrchestrator, companies: &[String]) {
  let logos = sync.logos();
  if let [company] = companies {
    let logo = logos.resolve_one(company).await;
    println!("{}", format_logo(company, &logo));
    return;
  }

  let resolved = logos.resolve_batch(companies).await;
  for company in companies {
    if let Some(logo) = resolved.get(company) {
      println!("{}", format_logo(company, logo));
    }
  }
}

fn format_job(job: &JobRecord) -> String {
  let title = job.field_str("title").unwrap_or("-");
  let status = job.field_str("status").unwrap_or("-");
  format!("{:<8} {:<24} {:<32} {}", job.id.to_string(), job.company, title, status)
}

fn format_logo(company: &str, logo: &LogoRef) -> String {
  match logo {
    LogoRef::Remote { url } => format!("{}: {}", company, url),
    LogoRef::Fallback(fallback) => format!(
      "{}: fallback {} {} ({})",
      company, fallback.initials, fallback.color, fallback.label
    ),
  }
}

fn describe_event(event: &SyncEvent) -> String {
  match event {
    SyncEvent::Loaded { count, source } => format!("loaded {} jobs from {:?}", count, source),
    SyncEvent::Refreshed { count } => format!("refreshed: {} jobs", count),
    SyncEvent::RefreshFailed(reason) => format!("refresh failed: {}", reason),
    SyncEvent::Mutated { count } => format!("updated: {} jobs", count),
  }
}

/// Format a duration as a short human-readable age
fn format_age(age: Duration) -> String {
  let secs = age.num_seconds().max(0);
  if secs < 60 {
    format!("{}s", secs)
  } else if secs < 3600 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else {
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use jobtrack::logos::FallbackGenerator;
  use jobtrack::sync::SnapshotSource;

  #[test]
  fn test_format_age() {
    assert_eq!(format_age(Duration::seconds(42)), "42s");
    assert_eq!(format_age(Duration::seconds(301)), "5m 1s");
    assert_eq!(format_age(Duration::seconds(7260)), "2h 1m");
    assert_eq!(format_age(Duration::seconds(-3)), "0s");
  }

  #[test]
  fn test_format_job_uses_placeholders() {
    let job = JobRecord::new(7, "Acme").with_field("title", "Engineer");
    let line = format_job(&job);
    assert!(line.starts_with("7"));
    assert!(line.contains("Acme"));
    assert!(line.contains("Engineer"));
    assert!(line.trim_end().ends_with('-'));
  }

  #[test]
  fn test_format_logo() {
    let remote = LogoRef::Remote {
      url: "https://cdn.example.com/acme.png".to_string(),
    };
    assert_eq!(
      format_logo("Acme", &remote),
      "Acme: https://cdn.example.com/acme.png"
    );
    assert!(format_logo("Acme", &FallbackGenerator::generate("Acme")).contains("fallback"));
  }

  #[test]
  fn test_describe_event() {
    let event = SyncEvent::Loaded {
      count: 3,
      source: SnapshotSource::Cache,
    };
    assert_eq!(describe_event(&event), "loaded 3 jobs from Cache");
  }
}
