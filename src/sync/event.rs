use tokio::sync::mpsc;

use super::orchestrator::SnapshotSource;

/// Tracker sync events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
  /// Collection adopted on activation without a network call
  Loaded { count: usize, source: SnapshotSource },
  /// Collection fetched from the remote service and cached
  Refreshed { count: usize },
  /// Fetch failed; the previous snapshot is still in place
  RefreshFailed(String),
  /// A committed mutation was applied and cached
  Mutated { count: usize },
}

/// Receiving end of the orchestrator's event stream
pub struct SyncEvents {
  rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl SyncEvents {
  pub(crate) fn channel() -> (mpsc::UnboundedSender<SyncEvent>, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { rx })
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<SyncEvent> {
    self.rx.recv().await
  }

  /// Take an already-delivered event without waiting
  pub fn try_next(&mut self) -> Option<SyncEvent> {
    self.rx.try_recv().ok()
  }
}
