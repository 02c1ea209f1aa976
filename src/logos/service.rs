//! Logo resolution: memory first, coalesced remote lookups, fallback always.

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::fallback::FallbackGenerator;
use super::key::CompanyKey;
use super::memo::{Claim, PendingHandle, ResolutionMemoCache};
use super::types::LogoRef;
use crate::api::{LogoProbe, LogoRemote};

type BatchHandle = Shared<BoxFuture<'static, Arc<HashMap<CompanyKey, LogoRef>>>>;

/// Resolves company names to logo references.
///
/// `resolve_one`, `resolve_batch` and `preload` never fail: anything that goes
/// wrong on the way to the remote service ends in a fallback reference.
/// Concurrent lookups for the same company share one remote call, and a
/// lookup keeps running (and populates the memo) even if every caller waiting
/// on it goes away.
#[derive(Clone)]
pub struct LogoResolutionService {
  memo: Arc<ResolutionMemoCache>,
  remote: Arc<dyn LogoRemote>,
}

impl LogoResolutionService {
  pub fn new(remote: Arc<dyn LogoRemote>) -> Self {
    Self {
      memo: Arc::new(ResolutionMemoCache::new()),
      remote,
    }
  }

  /// Number of settled entries.
  pub fn resolved_len(&self) -> usize {
    self.memo.len()
  }

  /// Number of lookups currently in flight.
  pub fn pending_len(&self) -> usize {
    self.memo.pending_len()
  }

  /// Synchronous peek: the settled reference, if there is one.
  pub fn cached(&self, company_name: &str) -> Option<LogoRef> {
    self
      .memo
      .get(&CompanyKey::normalize(company_name))
      .map(|entry| entry.logo)
  }

  /// Resolve a single company.
  pub async fn resolve_one(&self, company_name: &str) -> LogoRef {
    let key = CompanyKey::normalize(company_name);
    if key.is_empty() {
      return FallbackGenerator::generate(company_name);
    }

    let claim = self.memo.claim(&key, |token| {
      self.spawn_probe(key.clone(), company_name.trim().to_string(), token)
    });

    match claim {
      Claim::Resolved(logo) => logo,
      Claim::Joined(handle) => {
        debug!(company = %key, "Joining in-flight logo lookup");
        handle.await
      }
      Claim::Started(handle) => handle.await,
    }
  }

  /// Resolve many companies with at most one batched remote call.
  ///
  /// Returns one entry per distinct input string. Names already resolved are
  /// served from memory, names with a lookup in flight join it, and the rest
  /// go to the batch endpoint together.
  pub async fn resolve_batch<S: AsRef<str>>(&self, company_names: &[S]) -> HashMap<String, LogoRef> {
    let mut resolved = HashMap::with_capacity(company_names.len());
    let mut keys = Vec::new();
    let mut display: HashMap<CompanyKey, String> = HashMap::new();
    let mut requested: Vec<(String, CompanyKey)> = Vec::with_capacity(company_names.len());

    for name in company_names {
      let name = name.as_ref();
      let key = CompanyKey::normalize(name);
      if key.is_empty() {
        resolved.insert(name.to_string(), FallbackGenerator::generate(name));
        continue;
      }
      if !display.contains_key(&key) {
        display.insert(key.clone(), name.trim().to_string());
        keys.push(key.clone());
      }
      requested.push((name.to_string(), key));
    }

    if keys.is_empty() {
      return resolved;
    }

    let claims = self
      .memo
      .claim_many(&keys, |vacant| self.spawn_batch(vacant, &display));

    let mut by_key: HashMap<CompanyKey, LogoRef> = HashMap::with_capacity(keys.len());
    let mut waiting = Vec::new();
    for (key, claim) in claims {
      match claim {
        Claim::Resolved(logo) => {
          by_key.insert(key, logo);
        }
        Claim::Joined(handle) | Claim::Started(handle) => {
          waiting.push(async move { (key, handle.await) });
        }
      }
    }

    debug!(
      requested = keys.len(),
      cached = by_key.len(),
      awaiting = waiting.len(),
      "Resolving logo batch"
    );
    by_key.extend(join_all(waiting).await);

    for (name, key) in requested {
      let logo = by_key
        .get(&key)
        .cloned()
        .unwrap_or_else(|| FallbackGenerator::generate(&name));
      resolved.insert(name, logo);
    }
    resolved
  }

  /// Warm the memo in the background. Nothing is reported back.
  pub fn preload(&self, company_names: Vec<String>) -> JoinHandle<()> {
    let service = self.clone();
    tokio::spawn(async move {
      let resolved = service.resolve_batch(&company_names).await;
      let fallbacks = resolved.values().filter(|logo| logo.is_fallback()).count();
      debug!(total = resolved.len(), fallbacks, "Logo preload finished");
    })
  }

  /// Administrative eviction: one company, or everything when `None`.
  /// The next lookup goes back to the remote service.
  pub fn invalidate(&self, company_name: Option<&str>) {
    match company_name {
      Some(name) => {
        let key = CompanyKey::normalize(name);
        self.memo.evict(&key);
        info!(company = %key, "Logo cache entry invalidated");
      }
      None => {
        self.memo.evict_all();
        info!("Logo cache cleared");
      }
    }
  }

  pub fn invalidate_all(&self) {
    self.invalidate(None);
  }

  fn spawn_probe(&self, key: CompanyKey, name: String, token: u64) -> PendingHandle {
    let memo = Arc::clone(&self.memo);
    let remote = Arc::clone(&self.remote);
    let fallback_name = name.clone();

    let task = tokio::spawn(async move {
      let guard = PendingGuard::new(Arc::clone(&memo), vec![(key.clone(), token)]);

      let logo = match remote.probe(&name).await {
        Ok(LogoProbe::Found { url }) => LogoRef::Remote { url },
        Ok(LogoProbe::NotFound) => {
          debug!(company = %name, "No remote logo, using fallback");
          FallbackGenerator::generate(&name)
        }
        Err(e) => {
          warn!(company = %name, "Logo lookup failed, using fallback: {}", e);
          FallbackGenerator::generate(&name)
        }
      };

      memo.settle(&key, token, logo.clone());
      guard.disarm();
      logo
    });

    async move {
      task.await.unwrap_or_else(|e| {
        warn!("Logo lookup task failed: {}", e);
        FallbackGenerator::generate(&fallback_name)
      })
    }
    .boxed()
    .shared()
  }

  fn spawn_batch(
    &self,
    vacant: &[(CompanyKey, u64)],
    display: &HashMap<CompanyKey, String>,
  ) -> HashMap<CompanyKey, PendingHandle> {
    let slots: Vec<(CompanyKey, u64, String)> = vacant
      .iter()
      .map(|(key, token)| {
        let name = display.get(key).cloned().unwrap_or_else(|| key.to_string());
        (key.clone(), *token, name)
      })
      .collect();

    let memo = Arc::clone(&self.memo);
    let remote = Arc::clone(&self.remote);
    let task_slots = slots.clone();

    let task = tokio::spawn(async move {
      let guard = PendingGuard::new(
        Arc::clone(&memo),
        task_slots.iter().map(|(k, t, _)| (k.clone(), *t)).collect(),
      );
      let names: Vec<String> = task_slots.iter().map(|(_, _, name)| name.clone()).collect();

      let answers: HashMap<CompanyKey, String> = match remote.resolve_batch(&names).await {
        Ok(map) => map
          .into_iter()
          .filter_map(|(company, url)| Some((CompanyKey::normalize(&company), url?)))
          .collect(),
        Err(e) => {
          warn!(count = names.len(), "Batch logo lookup failed, using fallbacks: {}", e);
          HashMap::new()
        }
      };

      let outcomes: Vec<(CompanyKey, u64, LogoRef)> = task_slots
        .into_iter()
        .map(|(key, token, name)| {
          let logo = match answers.get(&key) {
            Some(url) => LogoRef::Remote { url: url.clone() },
            None => FallbackGenerator::generate(&name),
          };
          (key, token, logo)
        })
        .collect();

      memo.settle_many(outcomes.iter().cloned());
      guard.disarm();

      Arc::new(
        outcomes
          .into_iter()
          .map(|(key, _, logo)| (key, logo))
          .collect::<HashMap<_, _>>(),
      )
    });

    let batch: BatchHandle = async move {
      task.await.unwrap_or_else(|e| {
        warn!("Batch logo task failed: {}", e);
        Arc::new(HashMap::new())
      })
    }
    .boxed()
    .shared();

    slots
      .into_iter()
      .map(|(key, _, name)| {
        let batch = batch.clone();
        let lookup = key.clone();
        let handle = async move {
          batch
            .await
            .get(&lookup)
            .cloned()
            .unwrap_or_else(|| FallbackGenerator::generate(&name))
        }
        .boxed()
        .shared();
        (key, handle)
      })
      .collect()
  }
}

/// Clears pending slots if a lookup task ends without settling (panic, abort,
/// runtime shutdown), so a key can never stay stuck in flight.
struct PendingGuard {
  memo: Arc<ResolutionMemoCache>,
  slots: Vec<(CompanyKey, u64)>,
  armed: bool,
}

impl PendingGuard {
  fn new(memo: Arc<ResolutionMemoCache>, slots: Vec<(CompanyKey, u64)>) -> Self {
    Self {
      memo,
      slots,
      armed: true,
    }
  }

  fn disarm(mut self) {
    self.armed = false;
  }
}

impl Drop for PendingGuard {
  fn drop(&mut self) {
    if self.armed {
      for (key, token) in &self.slots {
        self.memo.clear_pending(key, *token);
      }
    }
  }
}
