//! Data access façade.
//!
//! One surface for reads and writes that behaves identically online and
//! offline. Writes try the network first when the link is up and fall back
//! to the pending collections and sync queue; reads merge unsynced local
//! records into the remote view so the user's own writes are always visible.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::RemoteApi;
use crate::assets::prepare_upload;
use crate::config::OfflineConfig;
use crate::error::{Error, Result};
use crate::model::{
  Action, EntityType, NewPayment, NewSuborganizer, Payment, PendingPayment, PendingSuborganizer,
  QueuePayload, ReceiptField, Suborganizer, SyncQueueItem,
};
use crate::status::StatusReporter;
use crate::store::{Store, StorageInfo};
use crate::sync::{DrainReport, SyncOrchestrator};

/// Background-sync tag for the payment (and receipt image) queue.
pub const PAYMENT_SYNC_TAG: &str = "payment-sync";
/// Background-sync tag for the suborganizer queue.
pub const SUBORGANIZER_SYNC_TAG: &str = "suborganizer-sync";

/// How a write was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum Saved<T> {
  /// Accepted by the remote API immediately.
  Synced(T),
  /// Recorded locally and queued for replay.
  Queued(T),
}

impl<T> Saved<T> {
  pub fn into_inner(self) -> T {
    match self {
      Saved::Synced(v) | Saved::Queued(v) => v,
    }
  }
}

/// Aggregates over the merged payment view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentStats {
  pub total_amount: f64,
  pub count: u64,
  pub suborganizers: u64,
  pub by_purpose: BTreeMap<String, f64>,
  pub by_mode: BTreeMap<String, f64>,
  pub latest_date: Option<String>,
}

pub struct Service<A: RemoteApi> {
  store: Arc<Store>,
  api: Arc<A>,
  orchestrator: SyncOrchestrator<A>,
  status: StatusReporter,
  config: OfflineConfig,
}

impl<A: RemoteApi> Service<A> {
  pub fn new(
    store: Arc<Store>,
    api: Arc<A>,
    status: StatusReporter,
    config: OfflineConfig,
  ) -> Self {
    let orchestrator = SyncOrchestrator::new(
      Arc::clone(&store),
      Arc::clone(&api),
      status.clone(),
      config.sync_retry_limit,
    );
    Self {
      store,
      api,
      orchestrator,
      status,
      config,
    }
  }

  // ==========================================================================
  // Payments
  // ==========================================================================

  /// Record a payment. Tries the remote API when the link is up; otherwise
  /// (or when the attempt fails at the network level) the record is stored
  /// locally and queued, and the call returns immediately.
  pub async fn create_payment(&self, record: NewPayment) -> Result<Saved<Payment>> {
    validate_payment(&record)?;

    if self.status.current().is_online {
      match self.api.create_payment(&record).await {
        Ok(created) => {
          self.mirror_synced_payment(&created)?;
          return Ok(Saved::Synced(created));
        }
        Err(Error::Network(e)) => {
          debug!(error = %e, "create payment failed at network level, queueing");
          self.status.set_online(false);
        }
        Err(e) => return Err(e),
      }
    }

    let pending = PendingPayment::new(record);
    self.store.put_payment(&pending)?;
    self.store.enqueue(&SyncQueueItem::create(
      pending.local_id.clone(),
      QueuePayload::Payment(pending.clone()),
    ))?;
    self.refresh_counts()?;
    info!(local_id = %pending.local_id, "payment queued for sync");
    Ok(Saved::Queued(pending.as_payment()))
  }

  /// Rewrite a payment. An unsynced record keeps its single queue entry; a
  /// synced one goes to the API (or queues an update when offline).
  pub async fn update_payment(&self, local_id: &str, record: NewPayment) -> Result<Saved<Payment>> {
    validate_payment(&record)?;
    let Some(mut pending) = self.store.get_payment(local_id)? else {
      return Err(Error::Validation(format!("unknown payment '{}'", local_id)));
    };
    pending.record = record;

    if let (true, Some(server_id)) = (self.status.current().is_online, pending.server_id.clone()) {
      match self.api.update_payment(&server_id, &pending.record).await {
        Ok(updated) => {
          self.store.put_payment(&pending)?;
          return Ok(Saved::Synced(updated));
        }
        Err(Error::Network(e)) => {
          debug!(error = %e, "update payment failed at network level, queueing");
          self.status.set_online(false);
        }
        Err(e) => return Err(e),
      }
    }

    pending.synced = false;
    self.store.put_payment(&pending)?;
    // Keyed by local id, so an unsynced record never grows a second entry.
    let action = if pending.server_id.is_some() {
      Action::Update
    } else {
      Action::Create
    };
    self.store.enqueue(&SyncQueueItem::new(
      pending.local_id.clone(),
      action,
      QueuePayload::Payment(pending.clone()),
    ))?;
    self.refresh_counts()?;
    Ok(Saved::Queued(pending.as_payment()))
  }

  pub async fn delete_payment(&self, local_id: &str) -> Result<()> {
    let Some(pending) = self.store.get_payment(local_id)? else {
      return Ok(());
    };

    let Some(server_id) = pending.server_id.clone() else {
      // Never accepted remotely; dropping the record and its queue entry
      // makes the write vanish entirely.
      self.store.remove_queue_item(local_id)?;
      self.store.delete_payment(local_id)?;
      self.refresh_counts()?;
      return Ok(());
    };

    if self.status.current().is_online {
      match self.api.delete_payment(&server_id).await {
        Ok(()) => {
          self.store.delete_payment(local_id)?;
          return Ok(());
        }
        Err(Error::Network(e)) => {
          debug!(error = %e, "delete payment failed at network level, queueing");
          self.status.set_online(false);
        }
        Err(e) => return Err(e),
      }
    }

    self.store.enqueue(&SyncQueueItem::new(
      pending.local_id.clone(),
      Action::Delete,
      QueuePayload::Payment(pending),
    ))?;
    self.refresh_counts()?;
    Ok(())
  }

  /// Remote payments with unsynced local records merged in front, so a write
  /// made moments ago offline shows up in the very next read.
  pub async fn list_payments(&self) -> Result<Vec<Payment>> {
    let remote = match self.api.list_payments().await {
      Ok(list) => list,
      Err(Error::Network(e)) => {
        debug!(error = %e, "payment list unavailable, serving local records only");
        Vec::new()
      }
      Err(e) => return Err(e),
    };

    let mut merged: Vec<Payment> = self
      .store
      .get_payments_by_synced(false)?
      .iter()
      .map(PendingPayment::as_payment)
      .collect();
    merged.extend(remote);
    Ok(merged)
  }

  /// Attach a receipt image to a payment. The blob is normalized first;
  /// offline it is held locally and queued ahead of the payment's own replay.
  pub async fn attach_receipt(
    &self,
    local_id: &str,
    field: ReceiptField,
    bytes: &[u8],
  ) -> Result<Saved<String>> {
    let Some(mut pending) = self.store.get_payment(local_id)? else {
      return Err(Error::Validation(format!("unknown payment '{}'", local_id)));
    };
    let prepared = prepare_upload(bytes, &self.config)?;
    let key = receipt_key(local_id, field);

    if self.status.current().is_online {
      match self
        .api
        .upload_image(&key, prepared.content_type, &prepared.bytes)
        .await
      {
        Ok(url) => {
          set_receipt_url(&mut pending, field, &url);
          self.store.put_payment(&pending)?;
          if let (true, Some(server_id)) = (pending.synced, &pending.server_id) {
            self.api.update_payment(server_id, &pending.record).await?;
          }
          return Ok(Saved::Synced(url));
        }
        Err(Error::Network(e)) => {
          debug!(error = %e, "receipt upload failed at network level, queueing");
          self.status.set_online(false);
        }
        Err(e) => return Err(e),
      }
    }

    self
      .store
      .put_asset(&key, &prepared.bytes, prepared.content_type)?;
    self.store.enqueue(&SyncQueueItem::create(
      key.clone(),
      QueuePayload::Image {
        key: key.clone(),
        content_type: prepared.content_type.to_string(),
        payment_local_id: Some(local_id.to_string()),
        field: Some(field),
      },
    ))?;
    self.refresh_counts()?;
    Ok(Saved::Queued(key))
  }

  // ==========================================================================
  // Suborganizers
  // ==========================================================================

  pub async fn create_suborganizer(&self, record: NewSuborganizer) -> Result<Saved<Suborganizer>> {
    validate_suborganizer(&record)?;

    if self.status.current().is_online {
      match self.api.create_suborganizer(&record).await {
        Ok(created) => {
          self.mirror_synced_suborganizer(&created)?;
          return Ok(Saved::Synced(created));
        }
        Err(Error::Network(e)) => {
          debug!(error = %e, "create suborganizer failed at network level, queueing");
          self.status.set_online(false);
        }
        Err(e) => return Err(e),
      }
    }

    let pending = PendingSuborganizer::new(record);
    self.store.put_suborganizer(&pending)?;
    self.store.enqueue(&SyncQueueItem::create(
      pending.local_id.clone(),
      QueuePayload::Suborganizer(pending.clone()),
    ))?;
    self.refresh_counts()?;
    info!(local_id = %pending.local_id, "suborganizer queued for sync");
    Ok(Saved::Queued(pending.as_suborganizer()))
  }

  pub async fn list_suborganizers(&self) -> Result<Vec<Suborganizer>> {
    let remote = match self.api.list_suborganizers().await {
      Ok(list) => list,
      Err(Error::Network(e)) => {
        debug!(error = %e, "suborganizer list unavailable, serving local records only");
        Vec::new()
      }
      Err(e) => return Err(e),
    };

    let mut merged: Vec<Suborganizer> = self
      .store
      .get_suborganizers_by_synced(false)?
      .iter()
      .map(PendingSuborganizer::as_suborganizer)
      .collect();
    merged.extend(remote);
    Ok(merged)
  }

  // ==========================================================================
  // Aggregates
  // ==========================================================================

  /// Totals over the merged payment view, offline writes included.
  pub async fn payment_stats(&self) -> Result<PaymentStats> {
    let payments = self.list_payments().await?;
    let mut stats = PaymentStats {
      count: payments.len() as u64,
      ..Default::default()
    };

    let mut suborganizers = std::collections::BTreeSet::new();
    for p in &payments {
      stats.total_amount += p.amount;
      suborganizers.insert(p.suborganizer_id.as_str());
      *stats.by_purpose.entry(p.purpose.clone()).or_default() += p.amount;
      *stats.by_mode.entry(p.payment_mode.clone()).or_default() += p.amount;
      if stats.latest_date.as_deref() < Some(p.date.as_str()) {
        stats.latest_date = Some(p.date.clone());
      }
    }
    stats.suborganizers = suborganizers.len() as u64;
    Ok(stats)
  }

  // ==========================================================================
  // Sync and status
  // ==========================================================================

  /// Drain the whole sync queue once.
  pub async fn sync(&self) -> Result<Option<DrainReport>> {
    self.orchestrator.drain().await
  }

  /// Drain one tagged queue, the way background sync registrations fire.
  pub async fn sync_tag(&self, tag: &str) -> Result<Option<DrainReport>> {
    match tag {
      PAYMENT_SYNC_TAG => {
        // Receipt images replay ahead of the payments that reference them.
        let images = self.orchestrator.drain_tagged(EntityType::Image).await?;
        let payments = self.orchestrator.drain_tagged(EntityType::Payment).await?;
        Ok(combine(images, payments))
      }
      SUBORGANIZER_SYNC_TAG => self.orchestrator.drain_tagged(EntityType::Suborganizer).await,
      other => Err(Error::Validation(format!("unknown sync tag '{}'", other))),
    }
  }

  /// Probe the remote API and record the result. Returns the new state.
  pub async fn probe(&self) -> bool {
    let online = self.api.ping().await;
    self.status.set_online(online);
    online
  }

  /// Drop all terminally failed queue items; returns how many.
  pub fn acknowledge_failures(&self) -> Result<u64> {
    let acknowledged = self.store.acknowledge_failures()?;
    self.refresh_counts()?;
    if acknowledged > 0 {
      warn!(acknowledged, "failed sync items acknowledged and dropped");
    }
    Ok(acknowledged)
  }

  /// Failed item ids with their final retry counts.
  pub fn failed_items(&self) -> Result<Vec<(String, u32)>> {
    self.store.failed_items()
  }

  /// Empty every local collection. Irreversible.
  pub fn reset(&self) -> Result<()> {
    self.store.clear_all()?;
    self.status.set_counts(0, 0);
    info!("local store reset");
    Ok(())
  }

  pub fn storage_info(&self) -> Result<StorageInfo> {
    self.store.storage_info()
  }

  pub fn status(&self) -> &StatusReporter {
    &self.status
  }

  // ==========================================================================
  // Internals
  // ==========================================================================

  /// Keep a local mirror of a record the API accepted directly, so offline
  /// reads include it without a round trip.
  fn mirror_synced_payment(&self, created: &Payment) -> Result<()> {
    let mirror = PendingPayment {
      local_id: created.id.clone(),
      server_id: Some(created.id.clone()),
      record: NewPayment {
        suborganizer_id: created.suborganizer_id.clone(),
        date: created.date.clone(),
        amount: created.amount,
        purpose: created.purpose.clone(),
        payment_mode: created.payment_mode.clone(),
        bill_receipt_url: created.bill_receipt_url.clone(),
        payment_screenshot_url: created.payment_screenshot_url.clone(),
        notes: created.notes.clone(),
      },
      synced: true,
      created_at: created.created_at,
    };
    self.store.put_payment(&mirror)
  }

  fn mirror_synced_suborganizer(&self, created: &Suborganizer) -> Result<()> {
    let mirror = PendingSuborganizer {
      local_id: created.id.clone(),
      server_id: Some(created.id.clone()),
      record: NewSuborganizer {
        name: created.name.clone(),
        phone: created.phone.clone(),
        village: created.village.clone(),
        crop_type: created.crop_type.clone(),
      },
      synced: true,
      created_at: created.created_at,
    };
    self.store.put_suborganizer(&mirror)
  }

  fn refresh_counts(&self) -> Result<()> {
    self
      .status
      .set_counts(self.store.pending_count()?, self.store.failed_count()?);
    Ok(())
  }
}

fn receipt_key(local_id: &str, field: ReceiptField) -> String {
  let suffix = match field {
    ReceiptField::BillReceipt => "bill",
    ReceiptField::PaymentScreenshot => "screenshot",
  };
  format!("{}_{}.jpg", local_id, suffix)
}

fn set_receipt_url(pending: &mut PendingPayment, field: ReceiptField, url: &str) {
  match field {
    ReceiptField::BillReceipt => pending.record.bill_receipt_url = Some(url.to_string()),
    ReceiptField::PaymentScreenshot => {
      pending.record.payment_screenshot_url = Some(url.to_string())
    }
  }
}

fn validate_payment(record: &NewPayment) -> Result<()> {
  if record.amount <= 0.0 || !record.amount.is_finite() {
    return Err(Error::Validation(format!(
      "amount must be a positive number, got {}",
      record.amount
    )));
  }
  if record.suborganizer_id.is_empty() {
    return Err(Error::Validation("a payment needs a suborganizer".into()));
  }
  if !crate::model::PAYMENT_PURPOSES.contains(&record.purpose.as_str()) {
    return Err(Error::Validation(format!(
      "unknown purpose '{}'",
      record.purpose
    )));
  }
  if !crate::model::PAYMENT_MODES.contains(&record.payment_mode.as_str()) {
    return Err(Error::Validation(format!(
      "unknown payment mode '{}'",
      record.payment_mode
    )));
  }
  Ok(())
}

fn validate_suborganizer(record: &NewSuborganizer) -> Result<()> {
  if record.name.trim().is_empty() {
    return Err(Error::Validation("a suborganizer needs a name".into()));
  }
  if !crate::model::CROP_TYPES.contains(&record.crop_type.as_str()) {
    return Err(Error::Validation(format!(
      "unknown crop type '{}'",
      record.crop_type
    )));
  }
  Ok(())
}

fn combine(a: Option<DrainReport>, b: Option<DrainReport>) -> Option<DrainReport> {
  match (a, b) {
    (Some(a), Some(b)) => Some(DrainReport {
      replayed: a.replayed + b.replayed,
      requeued: a.requeued + b.requeued,
      failed: a.failed + b.failed,
    }),
    (a, b) => a.or(b),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use std::collections::VecDeque;
  use std::sync::Mutex;

  #[derive(Default)]
  struct FakeApi {
    online: bool,
    payments: Mutex<VecDeque<Result<Payment>>>,
    remote_list: Mutex<Vec<Payment>>,
    uploads: Mutex<VecDeque<Result<String>>>,
  }

  impl RemoteApi for FakeApi {
    async fn ping(&self) -> bool {
      self.online
    }

    async fn create_payment(&self, _p: &NewPayment) -> Result<Payment> {
      self
        .payments
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(Error::Network("offline".into())))
    }

    async fn update_payment(&self, _id: &str, _p: &NewPayment) -> Result<Payment> {
      Err(Error::Network("offline".into()))
    }

    async fn delete_payment(&self, _id: &str) -> Result<()> {
      Err(Error::Network("offline".into()))
    }

    async fn list_payments(&self) -> Result<Vec<Payment>> {
      if self.online {
        Ok(self.remote_list.lock().unwrap().clone())
      } else {
        Err(Error::Network("offline".into()))
      }
    }

    async fn create_suborganizer(&self, _s: &NewSuborganizer) -> Result<Suborganizer> {
      Err(Error::Network("offline".into()))
    }

    async fn update_suborganizer(&self, _id: &str, _s: &NewSuborganizer) -> Result<Suborganizer> {
      Err(Error::Network("offline".into()))
    }

    async fn delete_suborganizer(&self, _id: &str) -> Result<()> {
      Err(Error::Network("offline".into()))
    }

    async fn list_suborganizers(&self) -> Result<Vec<Suborganizer>> {
      Ok(Vec::new())
    }

    async fn upload_image(&self, _key: &str, _ct: &str, _bytes: &[u8]) -> Result<String> {
      self
        .uploads
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(Error::Network("offline".into())))
    }
  }

  fn offline_service() -> Service<FakeApi> {
    service(FakeApi::default(), false)
  }

  fn service(api: FakeApi, online: bool) -> Service<FakeApi> {
    let store = Arc::new(Store::open_in_memory().unwrap());
    store.initialize_schema().unwrap();
    Service::new(
      store,
      Arc::new(api),
      StatusReporter::new(online),
      OfflineConfig::default(),
    )
  }

  fn record(amount: f64) -> NewPayment {
    NewPayment {
      suborganizer_id: "s1".into(),
      date: "2025-06-01".into(),
      amount,
      purpose: "Pesticides".into(),
      payment_mode: "Cash".into(),
      bill_receipt_url: None,
      payment_screenshot_url: None,
      notes: None,
    }
  }

  #[tokio::test]
  async fn test_offline_create_is_queued_and_immediately_readable() {
    let service = offline_service();

    let saved = service.create_payment(record(250.0)).await.unwrap();
    let Saved::Queued(payment) = saved else {
      panic!("expected a queued write while offline");
    };
    assert!(payment.id.starts_with("offline_"));

    // Queue entry shares the record's local id.
    let queue = service.store.queue_snapshot().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, payment.id);
    assert_eq!(service.status.current().pending_count, 1);

    // The very next read includes the write, network or not.
    let listed = service.list_payments().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, payment.id);
  }

  #[tokio::test]
  async fn test_online_create_goes_straight_to_api() {
    let api = FakeApi {
      online: true,
      payments: Mutex::new(VecDeque::from([Ok(remote_payment("srv-1", 250.0))])),
      ..Default::default()
    };
    let service = service(api, true);

    let saved = service.create_payment(record(250.0)).await.unwrap();
    assert!(matches!(saved, Saved::Synced(ref p) if p.id == "srv-1"));
    // Nothing left to replay.
    assert_eq!(service.store.pending_count().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_online_create_falls_back_to_queue_on_network_failure() {
    // Status says online but the request fails; the write must not be lost.
    let api = FakeApi {
      online: true,
      ..Default::default()
    };
    let service = service(api, true);

    let saved = service.create_payment(record(99.0)).await.unwrap();
    assert!(matches!(saved, Saved::Queued(_)));
    assert_eq!(service.store.pending_count().unwrap(), 1);
    assert!(!service.status.current().is_online);
  }

  #[tokio::test]
  async fn test_invalid_payment_is_rejected_not_queued() {
    let service = offline_service();
    let err = service.create_payment(record(-5.0)).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(service.store.pending_count().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_update_keeps_single_queue_entry() {
    let service = offline_service();
    let saved = service.create_payment(record(100.0)).await.unwrap();
    let id = saved.into_inner().id;

    service.update_payment(&id, record(175.0)).await.unwrap();

    let queue = service.store.queue_snapshot().unwrap();
    assert_eq!(queue.len(), 1);
    let QueuePayload::Payment(ref p) = queue[0].payload else {
      panic!("expected a payment payload");
    };
    assert_eq!(p.record.amount, 175.0);
  }

  #[tokio::test]
  async fn test_deleting_unsynced_payment_cancels_the_queued_write() {
    let service = offline_service();
    let saved = service.create_payment(record(100.0)).await.unwrap();
    let id = saved.into_inner().id;

    service.delete_payment(&id).await.unwrap();
    assert_eq!(service.store.pending_count().unwrap(), 0);
    assert!(service.list_payments().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_merged_list_puts_pending_records_first() {
    let api = FakeApi {
      online: true,
      remote_list: Mutex::new(vec![remote_payment("srv-1", 10.0)]),
      ..Default::default()
    };
    let service = service(api, true);

    // Force a local queued record alongside the remote one.
    let pending = PendingPayment::new(record(20.0));
    service.store.put_payment(&pending).unwrap();

    let listed = service.list_payments().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, pending.local_id);
    assert_eq!(listed[1].id, "srv-1");
  }

  #[tokio::test]
  async fn test_stats_cover_merged_view() {
    let service = offline_service();
    service.create_payment(record(100.0)).await.unwrap();
    let mut second = record(50.0);
    second.payment_mode = "Cheque".into();
    second.date = "2025-07-15".into();
    service.create_payment(second).await.unwrap();

    let stats = service.payment_stats().await.unwrap();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.total_amount, 150.0);
    assert_eq!(stats.suborganizers, 1);
    assert_eq!(stats.by_mode["Cash"], 100.0);
    assert_eq!(stats.by_mode["Cheque"], 50.0);
    assert_eq!(stats.latest_date.as_deref(), Some("2025-07-15"));
  }

  #[tokio::test]
  async fn test_unknown_sync_tag_is_rejected() {
    let service = offline_service();
    let err = service.sync_tag("image-sync").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[tokio::test]
  async fn test_reset_clears_store_and_counts() {
    let service = offline_service();
    service.create_payment(record(100.0)).await.unwrap();
    assert_eq!(service.status.current().pending_count, 1);

    service.reset().unwrap();
    assert_eq!(service.store.pending_count().unwrap(), 0);
    assert_eq!(service.status.current().pending_count, 0);
    assert!(service.list_payments().await.unwrap().is_empty());
  }

  fn remote_payment(id: &str, amount: f64) -> Payment {
    Payment {
      id: id.to_string(),
      suborganizer_id: "s1".into(),
      date: "2025-06-01".into(),
      amount,
      purpose: "Pesticides".into(),
      payment_mode: "Cash".into(),
      bill_receipt_url: None,
      payment_screenshot_url: None,
      notes: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }
}
