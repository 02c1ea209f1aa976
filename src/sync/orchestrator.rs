//! Tracker view controller: cache-hit vs. refresh, wholesale cache
//! replacement, and the background staleness check.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::WrapErr, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::event::{SyncEvent, SyncEvents};
use crate::api::JobsRemote;
use crate::cache::JobCollectionCache;
use crate::jobs::{distinct_companies, JobRecord, Mutation};
use crate::logos::LogoResolutionService;

/// Where the current snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
  /// Nothing loaded yet
  Empty,
  Cache,
  Network,
  /// Locally reconciled after a committed mutation
  Mutation,
}

/// What the tracker view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
  pub jobs: Vec<JobRecord>,
  pub source: SnapshotSource,
  pub loaded_at: Option<DateTime<Utc>>,
  /// Last refresh failure, cleared by the next successful load
  pub last_error: Option<String>,
}

impl Default for TrackerSnapshot {
  fn default() -> Self {
    Self {
      jobs: Vec::new(),
      source: SnapshotSource::Empty,
      loaded_at: None,
      last_error: None,
    }
  }
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
  /// How often to check the collection cache for staleness
  pub check_interval: Duration,
  /// Warm logos for every company after a refresh
  pub preload_logos: bool,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      check_interval: Duration::from_secs(30),
      preload_logos: true,
    }
  }
}

struct SyncInner {
  remote: Arc<dyn JobsRemote>,
  cache: Arc<JobCollectionCache>,
  logos: LogoResolutionService,
  state: Mutex<TrackerSnapshot>,
  events: tokio::sync::mpsc::UnboundedSender<SyncEvent>,
  settings: SyncSettings,
}

impl SyncInner {
  fn state(&self) -> MutexGuard<'_, TrackerSnapshot> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: SyncEvent) {
    // Nobody listening is fine
    let _ = self.events.send(event);
  }

  fn preload(&self, companies: Vec<String>) {
    if self.settings.preload_logos && !companies.is_empty() {
      self.logos.preload(companies);
    }
  }

  async fn refresh(&self) -> Result<Vec<JobRecord>> {
    match self.remote.fetch_jobs().await {
      Ok(jobs) => {
        {
          // Cache write and view state move together: the last refresh to
          // complete is the one both of them show.
          let mut state = self.state();
          self.cache.write(&jobs);
          *state = TrackerSnapshot {
            jobs: jobs.clone(),
            source: SnapshotSource::Network,
            loaded_at: Some(Utc::now()),
            last_error: None,
          };
        }
        info!(count = jobs.len(), "Job collection refreshed");
        self.emit(SyncEvent::Refreshed { count: jobs.len() });
        self.preload(distinct_companies(&jobs));
        Ok(jobs)
      }
      Err(e) => {
        warn!("Job collection refresh failed: {}", e);
        let message = e.to_string();
        self.state().last_error = Some(message.clone());
        self.emit(SyncEvent::RefreshFailed(message));
        Err(e).wrap_err("Failed to refresh job collection")
      }
    }
  }
}

/// Controller for the tracker view.
///
/// Owns writes to the job collection cache. Activation serves a valid cached
/// collection without touching the network; otherwise it fetches. Every
/// successful refresh or committed mutation replaces the cached collection in
/// full. While active, a background task re-fetches once the cache goes stale.
pub struct SyncOrchestrator {
  inner: Arc<SyncInner>,
  ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncOrchestrator {
  pub fn new(
    remote: Arc<dyn JobsRemote>,
    cache: Arc<JobCollectionCache>,
    logos: LogoResolutionService,
    settings: SyncSettings,
  ) -> (Self, SyncEvents) {
    let (events, rx) = SyncEvents::channel();
    let inner = SyncInner {
      remote,
      cache,
      logos,
      state: Mutex::new(TrackerSnapshot::default()),
      events,
      settings,
    };
    let orchestrator = Self {
      inner: Arc::new(inner),
      ticker: Mutex::new(None),
    };
    (orchestrator, rx)
  }

  /// Current view state.
  pub fn snapshot(&self) -> TrackerSnapshot {
    self.inner.state().clone()
  }

  pub fn logos(&self) -> &LogoResolutionService {
    &self.inner.logos
  }

  pub fn cache(&self) -> &JobCollectionCache {
    &self.inner.cache
  }

  /// Tracker view mounted: serve from cache or fetch, then start the
  /// staleness check. The check starts even if the fetch failed, so it
  /// doubles as the retry.
  pub async fn activate(&self) -> Result<TrackerSnapshot> {
    let result = match self.inner.cache.read() {
      Some(envelope) => {
        let count = envelope.items.len();
        {
          let mut state = self.inner.state();
          *state = TrackerSnapshot {
            jobs: envelope.items,
            source: SnapshotSource::Cache,
            loaded_at: Some(envelope.captured_at),
            last_error: None,
          };
        }
        debug!(count, "Tracker served from cache");
        self.inner.emit(SyncEvent::Loaded {
          count,
          source: SnapshotSource::Cache,
        });
        Ok(self.snapshot())
      }
      None => self.inner.refresh().await.map(|_| self.snapshot()),
    };

    self.start_ticker();
    result
  }

  /// Explicit refresh (user action, cache miss or expiry).
  pub async fn refresh(&self) -> Result<Vec<JobRecord>> {
    self.inner.refresh().await
  }

  /// Record a mutation the CRUD layer committed against the remote service.
  ///
  /// The reconciled collection replaces the cache immediately; no re-fetch.
  /// Before the first load the cached collection is the base; with no cache
  /// either, the cache is not written.
  /// Must be called from within a tokio runtime (logo preload is spawned).
  pub fn record_mutation(&self, mutation: Mutation) -> TrackerSnapshot {
    let snapshot = {
      let mut state = self.inner.state();
      if state.source == SnapshotSource::Empty {
        // Nothing loaded yet: reconcile against the cached collection, never
        // against an empty list.
        if let Some(envelope) = self.inner.cache.read() {
          state.jobs = envelope.items;
          state.source = SnapshotSource::Cache;
          state.loaded_at = Some(envelope.captured_at);
        }
      }

      let jobs = mutation.apply(&state.jobs);
      if state.source == SnapshotSource::Empty {
        // No base collection: a partial list must not be cached as valid.
        // The next activation fetches.
        debug!(?mutation, "Mutation before any load, cache left untouched");
        state.jobs = jobs;
      } else {
        self.inner.cache.write(&jobs);
        state.jobs = jobs;
        state.source = SnapshotSource::Mutation;
        state.loaded_at = Some(Utc::now());
      }
      state.clone()
    };

    debug!(count = snapshot.jobs.len(), ?mutation, "Mutation applied to job cache");
    self.inner.emit(SyncEvent::Mutated {
      count: snapshot.jobs.len(),
    });
    if let Some(company) = mutation.company() {
      self.inner.preload(vec![company.to_string()]);
    }
    snapshot
  }

  /// Tracker view unmounted: stop the staleness check. Logo lookups already
  /// in flight keep running.
  pub fn deactivate(&self) {
    if let Some(handle) = self.ticker_slot().take() {
      handle.abort();
      debug!("Staleness check stopped");
    }
  }

  pub fn is_active(&self) -> bool {
    self
      .ticker_slot()
      .as_ref()
      .is_some_and(|handle| !handle.is_finished())
  }

  fn ticker_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn start_ticker(&self) {
    let mut slot = self.ticker_slot();
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
      return;
    }

    let inner = Arc::clone(&self.inner);
    *slot = Some(tokio::spawn(async move {
      let mut interval = tokio::time::interval(inner.settings.check_interval);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
      // The first tick completes immediately
      interval.tick().await;

      loop {
        interval.tick().await;
        if !inner.cache.is_valid() {
          debug!("Job collection stale, refreshing");
          // Failures are already logged and emitted
          let _ = inner.refresh().await;
        }
      }
    }));
  }
}

impl Drop for SyncOrchestrator {
  fn drop(&mut self) {
    self.deactivate();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ApiError, LogoProbe, LogoRemote};
  use crate::cache::{ManualClock, MemoryStore};
  use crate::jobs::JobId;
  use async_trait::async_trait;
  use std::collections::{HashMap, VecDeque};
  use std::sync::atomic::{AtomicUsize, Ordering};

  type Response = (Duration, Result<Vec<JobRecord>, u16>);

  /// Serves queued responses in order, then repeats the last good one.
  #[derive(Default)]
  struct FakeJobs {
    queue: Mutex<VecDeque<Response>>,
    fallback: Mutex<Vec<JobRecord>>,
    calls: AtomicUsize,
  }

  impl FakeJobs {
    fn serving(jobs: Vec<JobRecord>) -> Self {
      Self {
        fallback: Mutex::new(jobs),
        ..Self::default()
      }
    }

    fn push(&self, delay: Duration, response: Result<Vec<JobRecord>, u16>) {
      self.queue.lock().unwrap().push_back((delay, response));
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl JobsRemote for FakeJobs {
    async fn fetch_jobs(&self) -> Result<Vec<JobRecord>, ApiError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let next = self.queue.lock().unwrap().pop_front();
      let (delay, response) = match next {
        Some(next) => next,
        None => (Duration::ZERO, Ok(self.fallback.lock().unwrap().clone())),
      };
      tokio::time::sleep(delay).await;
      response.map_err(|status| ApiError::Status {
        endpoint: "/jobs-collection".into(),
        status,
      })
    }
  }

  #[derive(Default)]
  struct FakeLogos {
    batches: AtomicUsize,
  }

  #[async_trait]
  impl LogoRemote for FakeLogos {
    async fn probe(&self, _company: &str) -> Result<LogoProbe, ApiError> {
      Ok(LogoProbe::NotFound)
    }

    async fn resolve_batch(
      &self,
      _companies: &[String],
    ) -> Result<HashMap<String, Option<String>>, ApiError> {
      self.batches.fetch_add(1, Ordering::SeqCst);
      Ok(HashMap::new())
    }
  }

  struct Harness {
    jobs: Arc<FakeJobs>,
    logos: Arc<FakeLogos>,
    clock: Arc<ManualClock>,
    cache: Arc<JobCollectionCache>,
  }

  impl Harness {
    fn new(jobs: FakeJobs) -> Self {
      let clock = Arc::new(ManualClock::new(Utc::now()));
      let cache = Arc::new(
        JobCollectionCache::new(Arc::new(MemoryStore::new())).with_clock(clock.clone()),
      );
      Self {
        jobs: Arc::new(jobs),
        logos: Arc::new(FakeLogos::default()),
        clock,
        cache,
      }
    }

    fn orchestrator(&self, check_interval: Duration) -> (SyncOrchestrator, SyncEvents) {
      SyncOrchestrator::new(
        self.jobs.clone(),
        self.cache.clone(),
        LogoResolutionService::new(self.logos.clone()),
        SyncSettings {
          check_interval,
          preload_logos: true,
        },
      )
    }
  }

  fn acme() -> Vec<JobRecord> {
    vec![JobRecord::new(1, "Acme")]
  }

  #[tokio::test]
  async fn test_activate_miss_fetches_writes_and_preloads() {
    let h = Harness::new(FakeJobs::serving(acme()));
    let (sync, mut events) = h.orchestrator(Duration::from_secs(60));

    let snapshot = sync.activate().await.unwrap();

    assert_eq!(snapshot.jobs, acme());
    assert_eq!(snapshot.source, SnapshotSource::Network);
    assert_eq!(h.jobs.calls(), 1);
    assert_eq!(h.cache.read().unwrap().items, acme());
    assert_eq!(events.try_next(), Some(SyncEvent::Refreshed { count: 1 }));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.logos.batches.load(Ordering::SeqCst), 1);
    assert!(sync.logos().cached("Acme").unwrap().is_fallback());
    assert!(sync.is_active());
  }

  #[tokio::test]
  async fn test_activate_hit_skips_network() {
    let h = Harness::new(FakeJobs::serving(Vec::new()));
    h.cache.write(&acme());
    let (sync, mut events) = h.orchestrator(Duration::from_secs(60));

    let snapshot = sync.activate().await.unwrap();

    assert_eq!(snapshot.jobs, acme());
    assert_eq!(snapshot.source, SnapshotSource::Cache);
    assert_eq!(h.jobs.calls(), 0);
    assert_eq!(
      events.try_next(),
      Some(SyncEvent::Loaded {
        count: 1,
        source: SnapshotSource::Cache
      })
    );
  }

  #[tokio::test]
  async fn test_refresh_failure_keeps_previous_snapshot() {
    let h = Harness::new(FakeJobs::serving(acme()));
    let (sync, mut events) = h.orchestrator(Duration::from_secs(60));
    sync.activate().await.unwrap();
    events.try_next();

    h.jobs.push(Duration::ZERO, Err(503));
    assert!(sync.refresh().await.is_err());

    let snapshot = sync.snapshot();
    assert_eq!(snapshot.jobs, acme());
    assert!(snapshot.last_error.unwrap().contains("503"));
    assert!(matches!(events.try_next(), Some(SyncEvent::RefreshFailed(_))));
    // Cached snapshot stays usable until the user retries.
    assert_eq!(h.cache.read().unwrap().items, acme());
  }

  #[tokio::test]
  async fn test_activate_failure_surfaces_error() {
    let h = Harness::new(FakeJobs::default());
    h.jobs.push(Duration::ZERO, Err(500));
    let (sync, _events) = h.orchestrator(Duration::from_secs(60));

    assert!(sync.activate().await.is_err());
    assert_eq!(sync.snapshot().source, SnapshotSource::Empty);
    assert!(h.cache.read().is_none());
  }

  #[tokio::test]
  async fn test_mutation_replaces_cache_without_refetch() {
    let h = Harness::new(FakeJobs::serving(acme()));
    let (sync, _events) = h.orchestrator(Duration::from_secs(60));
    sync.activate().await.unwrap();

    sync.record_mutation(Mutation::Created(JobRecord::new(2, "Globex")));
    let snapshot = sync.record_mutation(Mutation::Deleted(JobId::Number(1)));

    assert_eq!(snapshot.jobs, vec![JobRecord::new(2, "Globex")]);
    assert_eq!(snapshot.source, SnapshotSource::Mutation);
    assert_eq!(h.cache.read().unwrap().items, snapshot.jobs);
    assert_eq!(h.jobs.calls(), 1);
  }

  #[tokio::test]
  async fn test_mutation_before_activate_extends_cached_collection() {
    let h = Harness::new(FakeJobs::serving(Vec::new()));
    h.cache.write(&[
      JobRecord::new(1, "Acme"),
      JobRecord::new(2, "Globex"),
      JobRecord::new(3, "Initech"),
    ]);
    let (sync, _events) = h.orchestrator(Duration::from_secs(60));

    sync.record_mutation(Mutation::Created(JobRecord::new(4, "Hooli")));
    let snapshot = sync.activate().await.unwrap();

    assert_eq!(snapshot.source, SnapshotSource::Cache);
    assert_eq!(snapshot.jobs.len(), 4);
    assert_eq!(snapshot.jobs[0], JobRecord::new(4, "Hooli"));
    assert_eq!(h.jobs.calls(), 0);
  }

  #[tokio::test]
  async fn test_mutation_with_nothing_loaded_leaves_cache_empty() {
    let jobs = vec![JobRecord::new(1, "Acme"), JobRecord::new(2, "Globex")];
    let h = Harness::new(FakeJobs::serving(jobs.clone()));
    let (sync, _events) = h.orchestrator(Duration::from_secs(60));

    let snapshot = sync.record_mutation(Mutation::Created(JobRecord::new(3, "Hooli")));
    assert_eq!(snapshot.source, SnapshotSource::Empty);
    assert!(h.cache.read().is_none());

    let snapshot = sync.activate().await.unwrap();
    assert_eq!(snapshot.source, SnapshotSource::Network);
    assert_eq!(snapshot.jobs, jobs);
    assert_eq!(h.jobs.calls(), 1);
  }

  #[tokio::test]
  async fn test_last_completed_refresh_wins() {
    let h = Harness::new(FakeJobs::default());
    h.jobs.push(Duration::from_millis(50), Ok(acme()));
    h.jobs.push(
      Duration::from_millis(5),
      Ok(vec![JobRecord::new(9, "Initech")]),
    );
    let (sync, _events) = h.orchestrator(Duration::from_secs(60));

    let (slow, fast) = tokio::join!(sync.refresh(), sync.refresh());
    assert!(slow.is_ok() && fast.is_ok());

    assert_eq!(h.cache.read().unwrap().items, acme());
    assert_eq!(sync.snapshot().jobs, acme());
  }

  #[tokio::test]
  async fn test_staleness_check_refreshes_and_stops() {
    let h = Harness::new(FakeJobs::serving(acme()));
    let (sync, _events) = h.orchestrator(Duration::from_millis(10));
    sync.activate().await.unwrap();
    assert_eq!(h.jobs.calls(), 1);

    // Still fresh: the ticker leaves it alone.
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(h.jobs.calls(), 1);

    h.clock.advance(chrono::Duration::seconds(301));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(h.jobs.calls(), 2);
    assert!(h.cache.is_valid());

    sync.deactivate();
    assert!(!sync.is_active());
    h.clock.advance(chrono::Duration::seconds(301));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(h.jobs.calls(), 2);
  }
}
