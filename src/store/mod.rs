//! Local durable store: transactional key-value persistence for pending
//! records, the sync queue, and cached binary assets.
//!
//! Everything is persisted immediately on write; record collections never
//! expire, cached images may be pruned after the configured retention window.
//! Schema setup must run before any other operation and is idempotent.

mod schema;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::model::{
  Action, CachedAsset, EntityType, PendingPayment, PendingSuborganizer, QueuePayload, QueueState,
  SyncQueueItem,
};

/// A stored copy of a network response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub url: String,
  pub status: u16,
  pub content_type: String,
  pub body: Vec<u8>,
  pub cached_at: DateTime<Utc>,
}

/// Per-collection record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
  pub payments: u64,
  pub suborganizers: u64,
  pub sync_queue: u64,
  pub images: u64,
}

/// Durable store over a single SQLite database.
pub struct Store {
  conn: Mutex<Connection>,
  initialized: AtomicBool,
}

impl Store {
  /// Open (or create) the store at the default location.
  ///
  /// The schema is not set up here; call [`Store::initialize_schema`] before
  /// any other operation.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("failed to create data directory: {}", e)))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| Error::Storage(format!("failed to open {}: {}", path.display(), e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
      initialized: AtomicBool::new(false),
    })
  }

  /// In-memory store for tests.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    Ok(Self {
      conn: Mutex::new(conn),
      initialized: AtomicBool::new(false),
    })
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Storage("could not determine data directory".into()))?;

    Ok(data_dir.join("seedledger").join("offline.db"))
  }

  /// One-time schema setup. Safe to call repeatedly; later calls are no-ops.
  pub fn initialize_schema(&self) -> Result<()> {
    if self.initialized.load(Ordering::SeqCst) {
      return Ok(());
    }
    let conn = self.lock()?;
    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| Error::Storage(format!("failed to set up schema: {}", e)))?;
    drop(conn);
    self.initialized.store(true, Ordering::SeqCst);
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Storage(format!("lock poisoned: {}", e)))
  }

  /// Lock the connection, failing if the schema has not been initialized.
  fn guard(&self) -> Result<MutexGuard<'_, Connection>> {
    if !self.initialized.load(Ordering::SeqCst) {
      return Err(Error::Storage("schema not initialized".into()));
    }
    self.lock()
  }

  // ==========================================================================
  // Payments
  // ==========================================================================

  /// Insert or overwrite a pending payment by its local id.
  pub fn put_payment(&self, payment: &PendingPayment) -> Result<()> {
    let conn = self.guard()?;
    let data = serde_json::to_vec(payment)
      .map_err(|e| Error::Storage(format!("failed to serialize payment: {}", e)))?;

    conn.execute(
      "INSERT OR REPLACE INTO payments (local_id, server_id, data, synced, created_at)
       VALUES (?, ?, ?, ?, ?)",
      params![
        payment.local_id,
        payment.server_id,
        data,
        payment.synced,
        payment.created_at.to_rfc3339()
      ],
    )?;
    Ok(())
  }

  pub fn get_payment(&self, local_id: &str) -> Result<Option<PendingPayment>> {
    let conn = self.guard()?;
    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM payments WHERE local_id = ?",
        params![local_id],
        |row| row.get(0),
      )
      .optional()?;

    data.map(|d| decode(&d, "payment")).transpose()
  }

  /// Every pending payment; empty vec, never an error, when none exist.
  pub fn get_payments(&self) -> Result<Vec<PendingPayment>> {
    let conn = self.guard()?;
    let mut stmt = conn.prepare("SELECT data FROM payments ORDER BY created_at")?;
    collect_records(&mut stmt, [], "payment")
  }

  /// Pending payments filtered on the `synced` index.
  pub fn get_payments_by_synced(&self, synced: bool) -> Result<Vec<PendingPayment>> {
    let conn = self.guard()?;
    let mut stmt =
      conn.prepare("SELECT data FROM payments WHERE synced = ? ORDER BY created_at")?;
    collect_records(&mut stmt, params![synced], "payment")
  }

  /// Record remote acceptance: set `synced = true` and store the server id.
  pub fn mark_payment_synced(&self, local_id: &str, server_id: &str) -> Result<()> {
    if server_id.is_empty() {
      return Err(Error::Validation(
        "a synced record requires a non-empty server id".into(),
      ));
    }
    let Some(mut payment) = self.get_payment(local_id)? else {
      return Ok(());
    };
    payment.synced = true;
    payment.server_id = Some(server_id.to_string());
    self.put_payment(&payment)
  }

  /// Remove a payment record; no-op if the key is absent.
  pub fn delete_payment(&self, local_id: &str) -> Result<()> {
    let conn = self.guard()?;
    conn.execute("DELETE FROM payments WHERE local_id = ?", params![local_id])?;
    Ok(())
  }

  // ==========================================================================
  // Suborganizers
  // ==========================================================================

  pub fn put_suborganizer(&self, suborganizer: &PendingSuborganizer) -> Result<()> {
    let conn = self.guard()?;
    let data = serde_json::to_vec(suborganizer)
      .map_err(|e| Error::Storage(format!("failed to serialize suborganizer: {}", e)))?;

    conn.execute(
      "INSERT OR REPLACE INTO suborganizers (local_id, server_id, data, synced, created_at)
       VALUES (?, ?, ?, ?, ?)",
      params![
        suborganizer.local_id,
        suborganizer.server_id,
        data,
        suborganizer.synced,
        suborganizer.created_at.to_rfc3339()
      ],
    )?;
    Ok(())
  }

  pub fn get_suborganizer(&self, local_id: &str) -> Result<Option<PendingSuborganizer>> {
    let conn = self.guard()?;
    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM suborganizers WHERE local_id = ?",
        params![local_id],
        |row| row.get(0),
      )
      .optional()?;

    data.map(|d| decode(&d, "suborganizer")).transpose()
  }

  pub fn get_suborganizers(&self) -> Result<Vec<PendingSuborganizer>> {
    let conn = self.guard()?;
    let mut stmt = conn.prepare("SELECT data FROM suborganizers ORDER BY created_at")?;
    collect_records(&mut stmt, [], "suborganizer")
  }

  pub fn get_suborganizers_by_synced(&self, synced: bool) -> Result<Vec<PendingSuborganizer>> {
    let conn = self.guard()?;
    let mut stmt =
      conn.prepare("SELECT data FROM suborganizers WHERE synced = ? ORDER BY created_at")?;
    collect_records(&mut stmt, params![synced], "suborganizer")
  }

  pub fn mark_suborganizer_synced(&self, local_id: &str, server_id: &str) -> Result<()> {
    if server_id.is_empty() {
      return Err(Error::Validation(
        "a synced record requires a non-empty server id".into(),
      ));
    }
    let Some(mut suborganizer) = self.get_suborganizer(local_id)? else {
      return Ok(());
    };
    suborganizer.synced = true;
    suborganizer.server_id = Some(server_id.to_string());
    self.put_suborganizer(&suborganizer)
  }

  pub fn delete_suborganizer(&self, local_id: &str) -> Result<()> {
    let conn = self.guard()?;
    conn.execute(
      "DELETE FROM suborganizers WHERE local_id = ?",
      params![local_id],
    )?;
    Ok(())
  }

  // ==========================================================================
  // Sync queue
  // ==========================================================================

  /// Insert or overwrite a queue item. New items land at the back.
  pub fn enqueue(&self, item: &SyncQueueItem) -> Result<()> {
    let conn = self.guard()?;
    let payload = serde_json::to_vec(&item.payload)
      .map_err(|e| Error::Storage(format!("failed to serialize payload: {}", e)))?;

    conn.execute(
      "INSERT OR REPLACE INTO sync_queue
         (id, entity_type, action, payload, enqueued_at, retry_count, state, seq)
       VALUES (?, ?, ?, ?, ?, ?, ?,
         (SELECT COALESCE(MAX(seq), 0) + 1 FROM sync_queue))",
      params![
        item.id,
        item.entity_type().as_str(),
        item.action.as_str(),
        payload,
        item.enqueued_at.to_rfc3339(),
        item.retry_count,
        item.state.as_str()
      ],
    )?;
    Ok(())
  }

  /// Snapshot of all pending items in FIFO order.
  pub fn queue_snapshot(&self) -> Result<Vec<SyncQueueItem>> {
    self.queue_query(None)
  }

  /// Snapshot of pending items for one entity type, in FIFO order.
  pub fn queue_snapshot_for(&self, entity_type: EntityType) -> Result<Vec<SyncQueueItem>> {
    self.queue_query(Some(entity_type))
  }

  fn queue_query(&self, entity_type: Option<EntityType>) -> Result<Vec<SyncQueueItem>> {
    let conn = self.guard()?;
    let sql = match entity_type {
      Some(_) => {
        "SELECT id, action, payload, enqueued_at, retry_count, state
         FROM sync_queue WHERE state = 'pending' AND entity_type = ? ORDER BY seq"
      }
      None => {
        "SELECT id, action, payload, enqueued_at, retry_count, state
         FROM sync_queue WHERE state = 'pending' ORDER BY seq"
      }
    };
    let mut stmt = conn.prepare(sql)?;

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, Vec<u8>, String, u32, String)> {
      Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
      ))
    };

    let rows: Vec<_> = match entity_type {
      Some(et) => stmt
        .query_map(params![et.as_str()], map_row)?
        .collect::<rusqlite::Result<_>>()?,
      None => stmt
        .query_map([], map_row)?
        .collect::<rusqlite::Result<_>>()?,
    };

    let mut items = Vec::with_capacity(rows.len());
    for (id, action, payload, enqueued_at, retry_count, state) in rows {
      items.push(SyncQueueItem {
        id,
        action: Action::parse(&action)
          .ok_or_else(|| Error::Storage(format!("unknown queue action '{}'", action)))?,
        payload: decode::<QueuePayload>(&payload, "queue payload")?,
        enqueued_at: parse_datetime(&enqueued_at)?,
        retry_count,
        state: QueueState::parse(&state)
          .ok_or_else(|| Error::Storage(format!("unknown queue state '{}'", state)))?,
      });
    }
    Ok(items)
  }

  /// Remove a queue item after successful replay; no-op if absent.
  pub fn remove_queue_item(&self, id: &str) -> Result<()> {
    let conn = self.guard()?;
    conn.execute("DELETE FROM sync_queue WHERE id = ?", params![id])?;
    Ok(())
  }

  /// Record a failed attempt and move the item to the back of the queue.
  pub fn requeue(&self, id: &str, retry_count: u32) -> Result<()> {
    let conn = self.guard()?;
    conn.execute(
      "UPDATE sync_queue
       SET retry_count = ?, seq = (SELECT COALESCE(MAX(seq), 0) + 1 FROM sync_queue)
       WHERE id = ?",
      params![retry_count, id],
    )?;
    Ok(())
  }

  /// Mark an item as terminally failed. It stays visible until acknowledged.
  pub fn mark_queue_failed(&self, id: &str, retry_count: u32) -> Result<()> {
    let conn = self.guard()?;
    conn.execute(
      "UPDATE sync_queue SET state = 'failed', retry_count = ? WHERE id = ?",
      params![retry_count, id],
    )?;
    Ok(())
  }

  pub fn pending_count(&self) -> Result<u64> {
    self.count_queue("pending")
  }

  pub fn failed_count(&self) -> Result<u64> {
    self.count_queue("failed")
  }

  fn count_queue(&self, state: &str) -> Result<u64> {
    let conn = self.guard()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM sync_queue WHERE state = ?",
      params![state],
      |row| row.get(0),
    )?;
    Ok(count as u64)
  }

  /// Terminally failed items awaiting acknowledgement, oldest first.
  pub fn failed_items(&self) -> Result<Vec<(String, u32)>> {
    let conn = self.guard()?;
    let mut stmt = conn
      .prepare("SELECT id, retry_count FROM sync_queue WHERE state = 'failed' ORDER BY seq")?;
    let rows = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
  }

  /// Drop all terminally failed items; returns how many were acknowledged.
  pub fn acknowledge_failures(&self) -> Result<u64> {
    let conn = self.guard()?;
    let n = conn.execute("DELETE FROM sync_queue WHERE state = 'failed'", [])?;
    Ok(n as u64)
  }

  // ==========================================================================
  // Image assets
  // ==========================================================================

  pub fn put_asset(&self, key: &str, blob: &[u8], content_type: &str) -> Result<()> {
    let conn = self.guard()?;
    conn.execute(
      "INSERT OR REPLACE INTO images (url, blob, content_type, cached_at)
       VALUES (?, ?, ?, ?)",
      params![key, blob, content_type, Utc::now().to_rfc3339()],
    )?;
    Ok(())
  }

  pub fn get_asset(&self, key: &str) -> Result<Option<CachedAsset>> {
    let conn = self.guard()?;
    let row: Option<(Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT blob, content_type, cached_at FROM images WHERE url = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;

    match row {
      Some((blob, content_type, cached_at)) => Ok(Some(CachedAsset {
        key: key.to_string(),
        blob,
        content_type,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  pub fn delete_asset(&self, key: &str) -> Result<()> {
    let conn = self.guard()?;
    conn.execute("DELETE FROM images WHERE url = ?", params![key])?;
    Ok(())
  }

  /// Drop cached images older than the retention window. Advisory only.
  pub fn prune_assets(&self, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let conn = self.guard()?;
    let n = conn.execute(
      "DELETE FROM images WHERE cached_at < ?",
      params![cutoff.to_rfc3339()],
    )?;
    Ok(n as u64)
  }

  // ==========================================================================
  // Request cache
  // ==========================================================================

  pub fn put_response(
    &self,
    cache_name: &str,
    request_key: &str,
    response: &CachedResponse,
  ) -> Result<()> {
    let conn = self.guard()?;
    conn.execute(
      "INSERT OR REPLACE INTO request_cache
         (cache_name, request_key, url, status, content_type, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        cache_name,
        request_key,
        response.url,
        response.status,
        response.content_type,
        response.body,
        response.cached_at.to_rfc3339()
      ],
    )?;
    Ok(())
  }

  pub fn get_response(&self, cache_name: &str, request_key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.guard()?;
    let row: Option<(String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT url, status, content_type, body, cached_at
         FROM request_cache WHERE cache_name = ? AND request_key = ?",
        params![cache_name, request_key],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()?;

    match row {
      Some((url, status, content_type, body, cached_at)) => Ok(Some(CachedResponse {
        url,
        status,
        content_type,
        body,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  /// Delete every cache generation not in the current named set.
  pub fn purge_stale_generations(&self, current: &[&str]) -> Result<u64> {
    let conn = self.guard()?;
    let placeholders = vec!["?"; current.len()].join(", ");
    let sql = format!(
      "DELETE FROM request_cache WHERE cache_name NOT IN ({})",
      placeholders
    );
    let n = conn.execute(&sql, rusqlite::params_from_iter(current.iter()))?;
    Ok(n as u64)
  }

  // ==========================================================================
  // Maintenance
  // ==========================================================================

  /// Empty every collection. Irreversible; used for a user-initiated reset.
  pub fn clear_all(&self) -> Result<()> {
    let conn = self.guard()?;
    conn.execute_batch(
      "DELETE FROM payments;
       DELETE FROM suborganizers;
       DELETE FROM sync_queue;
       DELETE FROM images;
       DELETE FROM request_cache;",
    )?;
    Ok(())
  }

  pub fn storage_info(&self) -> Result<StorageInfo> {
    let conn = self.guard()?;
    let count = |table: &str| -> Result<u64> {
      let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
      })?;
      Ok(n as u64)
    };
    Ok(StorageInfo {
      payments: count("payments")?,
      suborganizers: count("suborganizers")?,
      sync_queue: count("sync_queue")?,
      images: count("images")?,
    })
  }
}

fn decode<T: serde::de::DeserializeOwned>(data: &[u8], what: &str) -> Result<T> {
  serde_json::from_slice(data)
    .map_err(|e| Error::Storage(format!("failed to deserialize {}: {}", what, e)))
}

fn collect_records<T: serde::de::DeserializeOwned, P: rusqlite::Params>(
  stmt: &mut rusqlite::Statement<'_>,
  params: P,
  what: &str,
) -> Result<Vec<T>> {
  let blobs: Vec<Vec<u8>> = stmt
    .query_map(params, |row| row.get(0))?
    .collect::<rusqlite::Result<_>>()?;

  blobs.iter().map(|b| decode(b, what)).collect()
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Storage(format!("failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::NewPayment;

  fn store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
  }

  fn payment(amount: f64) -> PendingPayment {
    PendingPayment::new(NewPayment {
      suborganizer_id: "sub-1".into(),
      date: "2025-06-01".into(),
      amount,
      purpose: "Pesticides".into(),
      payment_mode: "Cash".into(),
      bill_receipt_url: None,
      payment_screenshot_url: None,
      notes: None,
    })
  }

  #[test]
  fn test_operations_fail_before_schema_init() {
    let store = Store::open_in_memory().unwrap();
    let err = store.get_payments().unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
  }

  #[test]
  fn test_schema_init_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    store.initialize_schema().unwrap();
    store.initialize_schema().unwrap();
    store.initialize_schema().unwrap();

    store.put_payment(&payment(100.0)).unwrap();
    assert_eq!(store.get_payments().unwrap().len(), 1);
  }

  #[test]
  fn test_get_all_on_empty_collection_is_empty_not_error() {
    let store = store();
    assert!(store.get_payments().unwrap().is_empty());
    assert!(store.get_suborganizers().unwrap().is_empty());
    assert!(store.queue_snapshot().unwrap().is_empty());
  }

  #[test]
  fn test_synced_index_lookup() {
    let store = store();
    let a = payment(10.0);
    let b = payment(20.0);
    store.put_payment(&a).unwrap();
    store.put_payment(&b).unwrap();
    store.mark_payment_synced(&a.local_id, "srv-1").unwrap();

    let unsynced = store.get_payments_by_synced(false).unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].local_id, b.local_id);

    let synced = store.get_payments_by_synced(true).unwrap();
    assert_eq!(synced.len(), 1);
    assert_eq!(synced[0].server_id.as_deref(), Some("srv-1"));
  }

  #[test]
  fn test_mark_synced_requires_server_id() {
    let store = store();
    let p = payment(10.0);
    store.put_payment(&p).unwrap();
    let err = store.mark_payment_synced(&p.local_id, "").unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn test_delete_absent_key_is_noop() {
    let store = store();
    store.delete_payment("missing").unwrap();
    store.remove_queue_item("missing").unwrap();
  }

  #[test]
  fn test_queue_is_fifo_and_requeue_moves_to_back() {
    let store = store();
    let a = payment(1.0);
    let b = payment(2.0);
    store
      .enqueue(&SyncQueueItem::create(
        a.local_id.clone(),
        QueuePayload::Payment(a.clone()),
      ))
      .unwrap();
    store
      .enqueue(&SyncQueueItem::create(
        b.local_id.clone(),
        QueuePayload::Payment(b.clone()),
      ))
      .unwrap();

    let snapshot = store.queue_snapshot().unwrap();
    assert_eq!(snapshot[0].id, a.local_id);
    assert_eq!(snapshot[1].id, b.local_id);

    store.requeue(&a.local_id, 1).unwrap();
    let snapshot = store.queue_snapshot().unwrap();
    assert_eq!(snapshot[0].id, b.local_id);
    assert_eq!(snapshot[1].id, a.local_id);
    assert_eq!(snapshot[1].retry_count, 1);
  }

  #[test]
  fn test_failed_items_are_excluded_from_snapshot_but_counted() {
    let store = store();
    let a = payment(1.0);
    store
      .enqueue(&SyncQueueItem::create(
        a.local_id.clone(),
        QueuePayload::Payment(a.clone()),
      ))
      .unwrap();

    store.mark_queue_failed(&a.local_id, 3).unwrap();
    assert!(store.queue_snapshot().unwrap().is_empty());
    assert_eq!(store.pending_count().unwrap(), 0);
    assert_eq!(store.failed_count().unwrap(), 1);

    assert_eq!(store.acknowledge_failures().unwrap(), 1);
    assert_eq!(store.failed_count().unwrap(), 0);
  }

  #[test]
  fn test_asset_roundtrip_and_prune() {
    let store = store();
    store
      .put_asset("https://cdn/x.jpg", &[1, 2, 3], "image/jpeg")
      .unwrap();
    let asset = store.get_asset("https://cdn/x.jpg").unwrap().unwrap();
    assert_eq!(asset.blob, vec![1, 2, 3]);

    // Retention window in the future prunes nothing; a negative window
    // (cutoff after now) prunes everything.
    assert_eq!(store.prune_assets(30).unwrap(), 0);
    assert_eq!(store.prune_assets(-1).unwrap(), 1);
    assert!(store.get_asset("https://cdn/x.jpg").unwrap().is_none());
  }

  #[test]
  fn test_purge_stale_generations() {
    let store = store();
    let resp = CachedResponse {
      url: "https://api/x".into(),
      status: 200,
      content_type: "application/json".into(),
      body: b"{}".to_vec(),
      cached_at: Utc::now(),
    };
    store.put_response("api-cache-v1", "k1", &resp).unwrap();
    store.put_response("api-cache-v0", "k2", &resp).unwrap();

    let purged = store.purge_stale_generations(&["api-cache-v1"]).unwrap();
    assert_eq!(purged, 1);
    assert!(store.get_response("api-cache-v1", "k1").unwrap().is_some());
    assert!(store.get_response("api-cache-v0", "k2").unwrap().is_none());
  }

  #[test]
  fn test_clear_all_empties_every_collection() {
    let store = store();
    let p = payment(5.0);
    store.put_payment(&p).unwrap();
    store
      .enqueue(&SyncQueueItem::create(
        p.local_id.clone(),
        QueuePayload::Payment(p.clone()),
      ))
      .unwrap();
    store.put_asset("k", &[0], "image/png").unwrap();

    store.clear_all().unwrap();

    assert!(store.get_payments().unwrap().is_empty());
    assert!(store.get_suborganizers().unwrap().is_empty());
    assert!(store.queue_snapshot().unwrap().is_empty());
    assert_eq!(store.pending_count().unwrap(), 0);
    let info = store.storage_info().unwrap();
    assert_eq!(
      (info.payments, info.suborganizers, info.sync_queue, info.images),
      (0, 0, 0, 0)
    );
  }
}
