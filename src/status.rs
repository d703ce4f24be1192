//! Connectivity and sync status reporting.
//!
//! A single `ConnectivityStatus` owned by the reporter is the source of
//! truth for the rest of the application. Observers subscribe through a
//! watch channel and consume the state read-only; only the reporter's
//! methods mutate it.

use std::sync::Arc;
use tokio::sync::watch;

/// Process-wide connectivity and sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityStatus {
  /// Whether the remote API is currently reachable.
  pub is_online: bool,
  /// True once the local store has completed its one-time schema setup.
  pub is_initialized: bool,
  /// True exactly while a drain cycle is executing.
  pub sync_in_progress: bool,
  /// Count of unsynced sync-queue items, recomputed after every queue mutation.
  pub pending_count: u64,
  /// Terminally failed items awaiting acknowledgement.
  pub failed_count: u64,
}

impl ConnectivityStatus {
  fn new(is_online: bool) -> Self {
    Self {
      is_online,
      is_initialized: false,
      sync_in_progress: false,
      pending_count: 0,
      failed_count: 0,
    }
  }
}

/// Owner of the connectivity status; cheap to clone and hand to components.
#[derive(Clone)]
pub struct StatusReporter {
  tx: Arc<watch::Sender<ConnectivityStatus>>,
}

impl StatusReporter {
  pub fn new(is_online: bool) -> Self {
    let (tx, _rx) = watch::channel(ConnectivityStatus::new(is_online));
    Self { tx: Arc::new(tx) }
  }

  /// Observe status changes. Receivers are only notified on actual change.
  pub fn subscribe(&self) -> watch::Receiver<ConnectivityStatus> {
    self.tx.subscribe()
  }

  /// Snapshot of the current status.
  pub fn current(&self) -> ConnectivityStatus {
    self.tx.borrow().clone()
  }

  pub fn set_online(&self, is_online: bool) {
    self.tx.send_if_modified(|s| {
      let changed = s.is_online != is_online;
      s.is_online = is_online;
      changed
    });
  }

  /// Set exactly once after store initialization completes.
  pub fn set_initialized(&self) {
    self.tx.send_if_modified(|s| {
      let changed = !s.is_initialized;
      s.is_initialized = true;
      changed
    });
  }

  pub fn set_sync_in_progress(&self, in_progress: bool) {
    self.tx.send_if_modified(|s| {
      let changed = s.sync_in_progress != in_progress;
      s.sync_in_progress = in_progress;
      changed
    });
  }

  pub fn set_counts(&self, pending: u64, failed: u64) {
    self.tx.send_if_modified(|s| {
      let changed = s.pending_count != pending || s.failed_count != failed;
      s.pending_count = pending;
      s.failed_count = failed;
      changed
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_observers_see_online_transition() {
    let reporter = StatusReporter::new(false);
    let mut rx = reporter.subscribe();

    reporter.set_online(true);
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_online);
  }

  #[tokio::test]
  async fn test_unchanged_state_does_not_notify() {
    let reporter = StatusReporter::new(true);
    let mut rx = reporter.subscribe();
    rx.mark_unchanged();

    reporter.set_online(true); // already online
    assert!(!rx.has_changed().unwrap());
  }

  #[test]
  fn test_initialized_is_sticky() {
    let reporter = StatusReporter::new(true);
    reporter.set_initialized();
    reporter.set_initialized();
    assert!(reporter.current().is_initialized);
  }
}
