//! Session-lifetime memory of resolved logos and lookups in flight.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::key::CompanyKey;
use super::types::LogoRef;

/// Shared handle to an in-flight resolution. Every clone resolves to the
/// same reference.
pub type PendingHandle = Shared<BoxFuture<'static, LogoRef>>;

/// A settled resolution. Fallbacks are terminal values, not misses.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionEntry {
  pub key: CompanyKey,
  pub logo: LogoRef,
  pub resolved_at: DateTime<Utc>,
}

impl ResolutionEntry {
  pub fn new(key: CompanyKey, logo: LogoRef) -> Self {
    Self {
      key,
      logo,
      resolved_at: Utc::now(),
    }
  }
}

/// An in-flight resolution for one key.
#[derive(Clone)]
pub struct PendingResolution {
  pub key: CompanyKey,
  /// Identifies this slot; a settling task only clears its own slot
  pub token: u64,
  pub handle: PendingHandle,
}

/// Outcome of [`ResolutionMemoCache::claim`].
pub enum Claim {
  /// Already resolved
  Resolved(LogoRef),
  /// Someone else is resolving it; await their handle
  Joined(PendingHandle),
  /// The caller's lookup was registered and started
  Started(PendingHandle),
}

#[derive(Default)]
struct MemoState {
  resolved: HashMap<CompanyKey, ResolutionEntry>,
  pending: HashMap<CompanyKey, PendingResolution>,
  next_token: u64,
}

impl MemoState {
  fn issue_token(&mut self) -> u64 {
    self.next_token += 1;
    self.next_token
  }

  fn lookup(&self, key: &CompanyKey) -> Option<Claim> {
    if let Some(entry) = self.resolved.get(key) {
      return Some(Claim::Resolved(entry.logo.clone()));
    }
    self
      .pending
      .get(key)
      .map(|p| Claim::Joined(p.handle.clone()))
  }

  fn settle(&mut self, key: &CompanyKey, token: u64, logo: LogoRef) -> bool {
    match self.pending.get(key) {
      Some(p) if p.token == token => {
        self.pending.remove(key);
        self
          .resolved
          .insert(key.clone(), ResolutionEntry::new(key.clone(), logo));
        true
      }
      // Slot was evicted (or replaced) while we were in flight.
      _ => false,
    }
  }
}

/// Mapping from company key to resolved logo, plus the lookups in flight.
///
/// Every method takes the lock once and never across an await, so the
/// check-then-register sequence in [`claim`](Self::claim) is atomic with
/// respect to any other caller.
#[derive(Default)]
pub struct ResolutionMemoCache {
  state: Mutex<MemoState>,
}

impl ResolutionMemoCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, MemoState> {
    // A panic elsewhere can't leave the maps half-updated: every mutation
    // is a single insert/remove.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, key: &CompanyKey) -> Option<ResolutionEntry> {
    self.lock().resolved.get(key).cloned()
  }

  pub fn set(&self, key: CompanyKey, entry: ResolutionEntry) {
    self.lock().resolved.insert(key, entry);
  }

  pub fn get_pending(&self, key: &CompanyKey) -> Option<PendingResolution> {
    self.lock().pending.get(key).cloned()
  }

  /// Register a pending handle, replacing any existing slot. Returns its token.
  pub fn set_pending(&self, key: CompanyKey, handle: PendingHandle) -> u64 {
    let mut state = self.lock();
    let token = state.issue_token();
    state.pending.insert(
      key.clone(),
      PendingResolution { key, token, handle },
    );
    token
  }

  /// Remove the pending slot if it still carries `token`.
  pub fn clear_pending(&self, key: &CompanyKey, token: u64) -> bool {
    let mut state = self.lock();
    match state.pending.get(key) {
      Some(p) if p.token == token => {
        state.pending.remove(key);
        true
      }
      _ => false,
    }
  }

  /// Evict a resolved entry and any lookup in flight for it.
  pub fn evict(&self, key: &CompanyKey) {
    let mut state = self.lock();
    state.resolved.remove(key);
    state.pending.remove(key);
  }

  pub fn evict_all(&self) {
    let mut state = self.lock();
    state.resolved.clear();
    state.pending.clear();
  }

  pub fn len(&self) -> usize {
    self.lock().resolved.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn pending_len(&self) -> usize {
    self.lock().pending.len()
  }

  /// Resolve from memory, join an in-flight lookup, or register a new one.
  ///
  /// `start` runs under the lock with a fresh token and must only create the
  /// handle (spawn the work), never touch this cache.
  pub fn claim<F>(&self, key: &CompanyKey, start: F) -> Claim
  where
    F: FnOnce(u64) -> PendingHandle,
  {
    let mut state = self.lock();
    if let Some(claim) = state.lookup(key) {
      return claim;
    }

    let token = state.issue_token();
    let handle = start(token);
    state.pending.insert(
      key.clone(),
      PendingResolution {
        key: key.clone(),
        token,
        handle: handle.clone(),
      },
    );
    Claim::Started(handle)
  }

  /// Batch form of [`claim`](Self::claim). Keys neither resolved nor pending
  /// are handed to `start` together (with their tokens), which returns one
  /// handle per key. Results come back in input order.
  pub fn claim_many<F>(&self, keys: &[CompanyKey], start: F) -> Vec<(CompanyKey, Claim)>
  where
    F: FnOnce(&[(CompanyKey, u64)]) -> HashMap<CompanyKey, PendingHandle>,
  {
    let mut state = self.lock();
    let mut claims: Vec<(CompanyKey, Option<Claim>)> = Vec::with_capacity(keys.len());
    let mut vacant = Vec::new();

    for key in keys {
      let claim = state.lookup(key);
      if claim.is_none() {
        let token = state.issue_token();
        vacant.push((key.clone(), token));
      }
      claims.push((key.clone(), claim));
    }

    let mut handles = if vacant.is_empty() {
      HashMap::new()
    } else {
      start(&vacant)
    };

    for (key, token) in &vacant {
      if let Some(handle) = handles.get(key) {
        state.pending.insert(
          key.clone(),
          PendingResolution {
            key: key.clone(),
            token: *token,
            handle: handle.clone(),
          },
        );
      }
    }

    claims
      .into_iter()
      .filter_map(|(key, claim)| {
        let claim = match claim {
          Some(claim) => claim,
          None => Claim::Started(handles.remove(&key)?),
        };
        Some((key, claim))
      })
      .collect()
  }

  /// Record the outcome of the lookup holding `token` and clear its slot in
  /// one step. If the slot was evicted meanwhile the result is not stored.
  pub fn settle(&self, key: &CompanyKey, token: u64, logo: LogoRef) -> bool {
    self.lock().settle(key, token, logo)
  }

  /// Settle several lookups under one lock, so readers never see half a batch.
  pub fn settle_many<I>(&self, outcomes: I) -> usize
  where
    I: IntoIterator<Item = (CompanyKey, u64, LogoRef)>,
  {
    let mut state = self.lock();
    outcomes
      .into_iter()
      .filter(|(key, token, logo)| state.settle(key, *token, logo.clone()))
      .count()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::logos::fallback::FallbackGenerator;
  use futures::FutureExt;

  fn ready(logo: LogoRef) -> PendingHandle {
    async move { logo }.boxed().shared()
  }

  fn remote(url: &str) -> LogoRef {
    LogoRef::Remote { url: url.into() }
  }

  #[test]
  fn test_claim_registers_once() {
    let memo = ResolutionMemoCache::new();
    let key = CompanyKey::normalize("Acme");

    let first = memo.claim(&key, |_| ready(remote("a")));
    assert!(matches!(first, Claim::Started(_)));

    let second = memo.claim(&key, |_| panic!("second claim must join"));
    assert!(matches!(second, Claim::Joined(_)));
    assert_eq!(memo.pending_len(), 1);
  }

  #[test]
  fn test_settle_moves_pending_to_resolved() {
    let memo = ResolutionMemoCache::new();
    let key = CompanyKey::normalize("Acme");
    let mut token = 0;
    memo.claim(&key, |t| {
      token = t;
      ready(remote("a"))
    });

    assert!(memo.settle(&key, token, remote("a")));
    assert_eq!(memo.pending_len(), 0);
    assert_eq!(memo.get(&key).unwrap().logo, remote("a"));
    assert!(matches!(
      memo.claim(&key, |_| panic!("resolved")),
      Claim::Resolved(_)
    ));
  }

  #[test]
  fn test_settle_after_evict_is_dropped() {
    let memo = ResolutionMemoCache::new();
    let key = CompanyKey::normalize("Acme");
    let token = memo.set_pending(key.clone(), ready(remote("a")));

    memo.evict(&key);
    assert!(!memo.settle(&key, token, remote("a")));
    assert!(memo.get(&key).is_none());
  }

  #[test]
  fn test_clear_pending_ignores_foreign_token() {
    let memo = ResolutionMemoCache::new();
    let key = CompanyKey::normalize("Acme");
    let old = memo.set_pending(key.clone(), ready(remote("a")));
    let new = memo.set_pending(key.clone(), ready(remote("b")));

    assert!(!memo.clear_pending(&key, old));
    assert_eq!(memo.get_pending(&key).unwrap().token, new);
    assert!(memo.clear_pending(&key, new));
    assert!(memo.get_pending(&key).is_none());
  }

  #[test]
  fn test_claim_many_partitions() {
    let memo = ResolutionMemoCache::new();
    let cached = CompanyKey::normalize("Cached");
    let flying = CompanyKey::normalize("Flying");
    let fresh = CompanyKey::normalize("Fresh");

    memo.set(
      cached.clone(),
      ResolutionEntry::new(cached.clone(), FallbackGenerator::generate("Cached")),
    );
    memo.set_pending(flying.clone(), ready(remote("f")));

    let mut started = Vec::new();
    let claims = memo.claim_many(&[cached.clone(), flying.clone(), fresh.clone()], |vacant| {
      started = vacant.iter().map(|(k, _)| k.clone()).collect();
      vacant
        .iter()
        .map(|(k, _)| (k.clone(), ready(remote("n"))))
        .collect()
    });

    assert_eq!(started, vec![fresh.clone()]);
    assert!(matches!(claims[0].1, Claim::Resolved(_)));
    assert!(matches!(claims[1].1, Claim::Joined(_)));
    assert!(matches!(claims[2].1, Claim::Started(_)));
    assert!(memo.get_pending(&fresh).is_some());
  }

  #[test]
  fn test_evict_all() {
    let memo = ResolutionMemoCache::new();
    let key = CompanyKey::normalize("Acme");
    memo.set(key.clone(), ResolutionEntry::new(key.clone(), remote("a")));
    memo.set_pending(CompanyKey::normalize("Other"), ready(remote("b")));

    memo.evict_all();
    assert!(memo.is_empty());
    assert_eq!(memo.pending_len(), 0);
  }
}
