//! Sync orchestration: draining the queue against the remote API.

mod orchestrator;

pub use orchestrator::{DrainReport, SyncOrchestrator};
