//! Domain records, pending (unsynced) records, and sync-queue types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment purposes accepted by the record forms.
pub const PAYMENT_PURPOSES: &[&str] = &[
  "Pesticides",
  "Sowing Advance",
  "Labor Cost",
  "Rouging",
  "Detaching", // only for Maize
  "Seed Lifting",
  "Gunny Bags",
  "Transportation",
];

/// Payment modes accepted by the record forms.
pub const PAYMENT_MODES: &[&str] = &[
  "Cash",
  "Cheque",
  "PhonePe",
  "Google Pay",
  "Bank Transfer",
  "Other",
];

/// Crop types a suborganizer can be registered under.
pub const CROP_TYPES: &[&str] = &["Maize", "Wheat", "Rice", "Cotton", "Soybean", "Other"];

/// Domain fields of a payment, as entered by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
  pub suborganizer_id: String,
  /// ISO date (YYYY-MM-DD) the payment was made.
  pub date: String,
  pub amount: f64,
  pub purpose: String,
  pub payment_mode: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bill_receipt_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub payment_screenshot_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

/// Domain fields of a suborganizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSuborganizer {
  pub name: String,
  pub phone: String,
  pub village: String,
  pub crop_type: String,
}

/// A payment as known to the remote API (or projected from a pending record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
  pub id: String,
  pub suborganizer_id: String,
  pub date: String,
  pub amount: f64,
  pub purpose: String,
  pub payment_mode: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bill_receipt_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_screenshot_url: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A suborganizer as known to the remote API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suborganizer {
  pub id: String,
  pub name: String,
  pub phone: String,
  pub village: String,
  pub crop_type: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A payment recorded while offline, not yet accepted by the remote API.
///
/// Invariant: `synced == true` implies `server_id` is present and non-empty.
/// An unsynced record is only ever deleted by a full reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPayment {
  /// Client-generated key, primary key while unsynced.
  pub local_id: String,
  /// Identifier assigned by the remote API once the record is accepted.
  pub server_id: Option<String>,
  pub record: NewPayment,
  pub synced: bool,
  pub created_at: DateTime<Utc>,
}

impl PendingPayment {
  pub fn new(record: NewPayment) -> Self {
    Self {
      local_id: generate_local_id(),
      server_id: None,
      record,
      synced: false,
      created_at: Utc::now(),
    }
  }

  /// Project this pending record into the list-view shape.
  pub fn as_payment(&self) -> Payment {
    Payment {
      id: self.local_id.clone(),
      suborganizer_id: self.record.suborganizer_id.clone(),
      date: self.record.date.clone(),
      amount: self.record.amount,
      purpose: self.record.purpose.clone(),
      payment_mode: self.record.payment_mode.clone(),
      bill_receipt_url: self.record.bill_receipt_url.clone(),
      payment_screenshot_url: self.record.payment_screenshot_url.clone(),
      notes: self.record.notes.clone(),
      created_at: self.created_at,
      updated_at: self.created_at,
    }
  }
}

/// A suborganizer recorded while offline.
///
/// Same invariants as [`PendingPayment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSuborganizer {
  pub local_id: String,
  pub server_id: Option<String>,
  pub record: NewSuborganizer,
  pub synced: bool,
  pub created_at: DateTime<Utc>,
}

impl PendingSuborganizer {
  pub fn new(record: NewSuborganizer) -> Self {
    Self {
      local_id: generate_local_id(),
      server_id: None,
      record,
      synced: false,
      created_at: Utc::now(),
    }
  }

  pub fn as_suborganizer(&self) -> Suborganizer {
    Suborganizer {
      id: self.local_id.clone(),
      name: self.record.name.clone(),
      phone: self.record.phone.clone(),
      village: self.record.village.clone(),
      crop_type: self.record.crop_type.clone(),
      created_at: self.created_at,
      updated_at: self.created_at,
    }
  }
}

/// Entity kinds the sync queue can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
  Payment,
  Suborganizer,
  Image,
}

impl EntityType {
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityType::Payment => "payment",
      EntityType::Suborganizer => "suborganizer",
      EntityType::Image => "image",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "payment" => Some(EntityType::Payment),
      "suborganizer" => Some(EntityType::Suborganizer),
      "image" => Some(EntityType::Image),
      _ => None,
    }
  }
}

/// Operation to replay against the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  Create,
  Update,
  Delete,
}

impl Action {
  pub fn as_str(&self) -> &'static str {
    match self {
      Action::Create => "create",
      Action::Update => "update",
      Action::Delete => "delete",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "create" => Some(Action::Create),
      "update" => Some(Action::Update),
      "delete" => Some(Action::Delete),
      _ => None,
    }
  }
}

/// The data required to replay a queued operation, tagged by entity type so
/// replay dispatch is exhaustive and new entity kinds are a compile-time
/// addition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum QueuePayload {
  Payment(PendingPayment),
  Suborganizer(PendingSuborganizer),
  Image {
    /// Key of the blob in the local image collection.
    key: String,
    content_type: String,
    /// Pending payment whose URL fields should point at the uploaded image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payment_local_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<ReceiptField>,
  },
}

/// Which payment field an uploaded image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptField {
  BillReceipt,
  PaymentScreenshot,
}

impl QueuePayload {
  pub fn entity_type(&self) -> EntityType {
    match self {
      QueuePayload::Payment(_) => EntityType::Payment,
      QueuePayload::Suborganizer(_) => EntityType::Suborganizer,
      QueuePayload::Image { .. } => EntityType::Image,
    }
  }
}

/// Lifecycle of a queue item.
///
/// `Failed` items stay visible in failure counts until acknowledged; they are
/// never silently discarded and never retried again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
  Pending,
  Failed,
}

impl QueueState {
  pub fn as_str(&self) -> &'static str {
    match self {
      QueueState::Pending => "pending",
      QueueState::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pending" => Some(QueueState::Pending),
      "failed" => Some(QueueState::Failed),
      _ => None,
    }
  }
}

/// One pending operation, keyed by the associated record's `local_id`.
#[derive(Debug, Clone)]
pub struct SyncQueueItem {
  pub id: String,
  pub action: Action,
  pub payload: QueuePayload,
  pub enqueued_at: DateTime<Utc>,
  pub retry_count: u32,
  pub state: QueueState,
}

impl SyncQueueItem {
  pub fn create(id: String, payload: QueuePayload) -> Self {
    Self::new(id, Action::Create, payload)
  }

  pub fn new(id: String, action: Action, payload: QueuePayload) -> Self {
    Self {
      id,
      action,
      payload,
      enqueued_at: Utc::now(),
      retry_count: 0,
      state: QueueState::Pending,
    }
  }

  pub fn entity_type(&self) -> EntityType {
    self.payload.entity_type()
  }
}

/// A fetched binary asset kept for offline display.
#[derive(Debug, Clone)]
pub struct CachedAsset {
  pub key: String,
  pub blob: Vec<u8>,
  pub content_type: String,
  pub cached_at: DateTime<Utc>,
}

/// Generate a client-side identifier: millisecond timestamp plus a random
/// suffix, globally unique within the local store.
pub fn generate_local_id() -> String {
  let suffix = Uuid::new_v4().simple().to_string();
  format!("offline_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_local_ids_are_unique() {
    let a = generate_local_id();
    let b = generate_local_id();
    assert_ne!(a, b);
    assert!(a.starts_with("offline_"));
  }

  #[test]
  fn test_payload_dispatches_by_entity_type() {
    let pending = PendingPayment::new(NewPayment {
      suborganizer_id: "s1".into(),
      date: "2025-06-01".into(),
      amount: 1200.0,
      purpose: "Pesticides".into(),
      payment_mode: "Cash".into(),
      bill_receipt_url: None,
      payment_screenshot_url: None,
      notes: None,
    });
    let payload = QueuePayload::Payment(pending);
    assert_eq!(payload.entity_type(), EntityType::Payment);

    let json = serde_json::to_string(&payload).unwrap();
    assert!(json.contains("\"entity_type\":\"payment\""));
  }
}
