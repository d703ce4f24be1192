//! Queue drain cycles.
//!
//! A drain replays queued operations strictly in FIFO order, one at a time.
//! Transient failures push the item to the back of the queue with its retry
//! count bumped; terminal failures park it as failed until acknowledged. At
//! most one drain runs at a time per orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::RemoteApi;
use crate::error::{Error, Result};
use crate::model::{
  Action, EntityType, PendingPayment, PendingSuborganizer, QueuePayload, ReceiptField,
  SyncQueueItem,
};
use crate::status::StatusReporter;
use crate::store::Store;

/// Outcome of one drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  /// Items replayed successfully and removed from the queue.
  pub replayed: u64,
  /// Items that failed transiently and went back to the queue.
  pub requeued: u64,
  /// Items parked as terminally failed this cycle.
  pub failed: u64,
}

pub struct SyncOrchestrator<A: RemoteApi> {
  store: Arc<Store>,
  api: Arc<A>,
  status: StatusReporter,
  retry_limit: u32,
  draining: AtomicBool,
}

/// Resets the drain flag and progress bit even when a cycle errors out.
struct DrainGuard<'a> {
  draining: &'a AtomicBool,
  status: &'a StatusReporter,
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    self.draining.store(false, Ordering::SeqCst);
    self.status.set_sync_in_progress(false);
  }
}

impl<A: RemoteApi> SyncOrchestrator<A> {
  pub fn new(store: Arc<Store>, api: Arc<A>, status: StatusReporter, retry_limit: u32) -> Self {
    Self {
      store,
      api,
      status,
      retry_limit,
      draining: AtomicBool::new(false),
    }
  }

  /// Drain every pending item. Returns `None` when a drain is already in
  /// progress; concurrent triggers collapse into the running cycle.
  pub async fn drain(&self) -> Result<Option<DrainReport>> {
    self.drain_items(None).await
  }

  /// Drain pending items of one entity type only.
  pub async fn drain_tagged(&self, entity_type: EntityType) -> Result<Option<DrainReport>> {
    self.drain_items(Some(entity_type)).await
  }

  async fn drain_items(&self, entity_type: Option<EntityType>) -> Result<Option<DrainReport>> {
    if self
      .draining
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      debug!("drain already in progress, skipping");
      return Ok(None);
    }
    let _guard = DrainGuard {
      draining: &self.draining,
      status: &self.status,
    };
    self.status.set_sync_in_progress(true);

    let snapshot = match entity_type {
      Some(et) => self.store.queue_snapshot_for(et)?,
      None => self.store.queue_snapshot()?,
    };
    debug!(items = snapshot.len(), "drain cycle started");

    let mut report = DrainReport::default();
    for item in snapshot {
      match self.replay(&item).await {
        Ok(()) => {
          self.store.remove_queue_item(&item.id)?;
          self.status.set_online(true);
          report.replayed += 1;
        }
        Err(e) if e.is_retryable() => {
          self.status.set_online(false);
          let retries = item.retry_count + 1;
          if retries < self.retry_limit {
            warn!(id = %item.id, retries, error = %e, "replay failed, requeued");
            self.store.requeue(&item.id, retries)?;
            report.requeued += 1;
          } else {
            let err = Error::Replay {
              id: item.id.clone(),
              retries,
              reason: e.to_string(),
            };
            warn!(error = %err, "replay retries exhausted");
            self.store.mark_queue_failed(&item.id, retries)?;
            report.failed += 1;
          }
        }
        Err(e) => {
          // Terminal rejection; never retried.
          warn!(id = %item.id, error = %e, "replay failed terminally");
          self.store.mark_queue_failed(&item.id, item.retry_count)?;
          report.failed += 1;
        }
      }
      self.refresh_counts()?;
    }

    info!(
      replayed = report.replayed,
      requeued = report.requeued,
      failed = report.failed,
      "drain cycle finished"
    );
    Ok(Some(report))
  }

  /// Recompute queue counts after every queue mutation.
  fn refresh_counts(&self) -> Result<()> {
    self
      .status
      .set_counts(self.store.pending_count()?, self.store.failed_count()?);
    Ok(())
  }

  async fn replay(&self, item: &SyncQueueItem) -> Result<()> {
    match &item.payload {
      QueuePayload::Payment(pending) => self.replay_payment(item.action, pending).await,
      QueuePayload::Suborganizer(pending) => self.replay_suborganizer(item.action, pending).await,
      QueuePayload::Image {
        key,
        content_type,
        payment_local_id,
        field,
      } => {
        self
          .replay_image(key, content_type, payment_local_id.as_deref(), *field)
          .await
      }
    }
  }

  async fn replay_payment(&self, action: Action, queued: &PendingPayment) -> Result<()> {
    // Prefer the stored record over the queued snapshot; an earlier image
    // replay may have rewritten its receipt URLs.
    let current = self
      .store
      .get_payment(&queued.local_id)?
      .unwrap_or_else(|| queued.clone());

    match action {
      Action::Create => {
        if current.synced {
          return Ok(());
        }
        let created = self.api.create_payment(&current.record).await?;
        self.store.mark_payment_synced(&current.local_id, &created.id)
      }
      Action::Update => match &current.server_id {
        Some(server_id) => {
          self.api.update_payment(server_id, &current.record).await?;
          // An offline edit cleared the synced flag when it queued.
          self.store.mark_payment_synced(&current.local_id, server_id)
        }
        // Never accepted remotely; an update of an unsynced record is a create.
        None => {
          let created = self.api.create_payment(&current.record).await?;
          self.store.mark_payment_synced(&current.local_id, &created.id)
        }
      },
      Action::Delete => {
        if let Some(server_id) = &current.server_id {
          self.api.delete_payment(server_id).await?;
        }
        self.store.delete_payment(&current.local_id)
      }
    }
  }

  async fn replay_suborganizer(&self, action: Action, queued: &PendingSuborganizer) -> Result<()> {
    let current = self
      .store
      .get_suborganizer(&queued.local_id)?
      .unwrap_or_else(|| queued.clone());

    match action {
      Action::Create => {
        if current.synced {
          return Ok(());
        }
        let created = self.api.create_suborganizer(&current.record).await?;
        self
          .store
          .mark_suborganizer_synced(&current.local_id, &created.id)
      }
      Action::Update => match &current.server_id {
        Some(server_id) => {
          self
            .api
            .update_suborganizer(server_id, &current.record)
            .await?;
          self
            .store
            .mark_suborganizer_synced(&current.local_id, server_id)
        }
        None => {
          let created = self.api.create_suborganizer(&current.record).await?;
          self
            .store
            .mark_suborganizer_synced(&current.local_id, &created.id)
        }
      },
      Action::Delete => {
        if let Some(server_id) = &current.server_id {
          self.api.delete_suborganizer(server_id).await?;
        }
        self.store.delete_suborganizer(&current.local_id)
      }
    }
  }

  /// Upload a locally held image blob, then point the owning payment's
  /// receipt field at the public URL so the payment replays with it.
  async fn replay_image(
    &self,
    key: &str,
    content_type: &str,
    payment_local_id: Option<&str>,
    field: Option<ReceiptField>,
  ) -> Result<()> {
    let Some(asset) = self.store.get_asset(key)? else {
      // Blob already uploaded or pruned; nothing left to replay.
      debug!(key, "image blob absent, skipping upload");
      return Ok(());
    };

    let url = self.api.upload_image(key, content_type, &asset.blob).await?;

    if let (Some(local_id), Some(field)) = (payment_local_id, field) {
      if let Some(mut payment) = self.store.get_payment(local_id)? {
        match field {
          ReceiptField::BillReceipt => payment.record.bill_receipt_url = Some(url.clone()),
          ReceiptField::PaymentScreenshot => {
            payment.record.payment_screenshot_url = Some(url.clone())
          }
        }
        self.store.put_payment(&payment)?;
        // The payment may already have replayed without this URL.
        if let (true, Some(server_id)) = (payment.synced, &payment.server_id) {
          self.api.update_payment(server_id, &payment.record).await?;
        }
      }
    }

    self.store.delete_asset(key)
  }
}
