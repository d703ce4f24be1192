//! Remote data API: the trait seam plus the HTTP client implementation.
//!
//! The orchestrator and façade talk to the backend exclusively through
//! [`RemoteApi`], so replay and drain logic can be exercised against fakes.

mod client;

pub use client::ApiClient;

use std::future::Future;

use crate::error::Result;
use crate::model::{NewPayment, NewSuborganizer, Payment, Suborganizer};

/// HTTPS JSON endpoints for payments and suborganizers.
///
/// Success is any 2xx response with a body matching the entity shape.
/// Implementations classify failures: network-level failures and 5xx map to
/// `Error::Network` (retryable), 4xx map to `Error::Validation` (terminal).
pub trait RemoteApi: Send + Sync {
  /// Lightweight reachability probe; never errors.
  fn ping(&self) -> impl Future<Output = bool> + Send;

  fn create_payment(&self, payment: &NewPayment) -> impl Future<Output = Result<Payment>> + Send;

  fn update_payment(
    &self,
    id: &str,
    payment: &NewPayment,
  ) -> impl Future<Output = Result<Payment>> + Send;

  fn delete_payment(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

  fn list_payments(&self) -> impl Future<Output = Result<Vec<Payment>>> + Send;

  fn create_suborganizer(
    &self,
    suborganizer: &NewSuborganizer,
  ) -> impl Future<Output = Result<Suborganizer>> + Send;

  fn update_suborganizer(
    &self,
    id: &str,
    suborganizer: &NewSuborganizer,
  ) -> impl Future<Output = Result<Suborganizer>> + Send;

  fn delete_suborganizer(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

  fn list_suborganizers(&self) -> impl Future<Output = Result<Vec<Suborganizer>>> + Send;

  /// Upload an image blob; returns its public URL.
  fn upload_image(
    &self,
    key: &str,
    content_type: &str,
    bytes: &[u8],
  ) -> impl Future<Output = Result<String>> + Send;
}
