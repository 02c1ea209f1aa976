//! Keeps the tracker view, the job collection cache and the logo cache in step.

mod event;
mod orchestrator;

pub use event::{SyncEvent, SyncEvents};
pub use orchestrator::{SnapshotSource, SyncOrchestrator, SyncSettings, TrackerSnapshot};
