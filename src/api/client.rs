//! HTTP implementation of [`RemoteApi`] on top of the cache layer.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::cache::{CacheLayer, FetchResponse, HttpRequest, HttpTransport, Method, ResponseSource};
use crate::error::{Error, Result};
use crate::model::{NewPayment, NewSuborganizer, Payment, Suborganizer};

use super::RemoteApi;

/// Storage bucket for uploaded receipt images.
const RECEIPT_BUCKET: &str = "receipts";

/// JSON client for the payments backend. All traffic goes through the cache
/// layer so reads keep working from stored copies while offline.
pub struct ApiClient<T: HttpTransport> {
  cache: CacheLayer<T>,
  base: Url,
  token: Option<String>,
}

impl<T: HttpTransport> ApiClient<T> {
  /// `base` is the API root, e.g. `https://host/rest/v1/`. A missing
  /// trailing slash would make `join` drop the last path segment, so one is
  /// appended when absent.
  pub fn new(cache: CacheLayer<T>, mut base: Url, token: Option<String>) -> Self {
    if !base.path().ends_with('/') {
      base.set_path(&format!("{}/", base.path()));
    }
    Self { cache, base, token }
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| Error::Validation(format!("bad endpoint '{}': {}", path, e)))
  }

  fn request(&self, url: &Url) -> HttpRequest {
    HttpRequest::get(url.as_str()).with_bearer(self.token.clone())
  }

  async fn read_json<R: DeserializeOwned>(&self, url: Url) -> Result<R> {
    let resp = self.cache.fetch(self.request(&url)).await?;
    decode(classified(resp)?)
  }

  async fn write_json<B: serde::Serialize, R: DeserializeOwned>(
    &self,
    method: Method,
    url: Url,
    body: &B,
  ) -> Result<R> {
    let payload = serde_json::to_vec(body).map_err(|e| Error::Validation(e.to_string()))?;
    let req = self.request(&url).with_json_body(method, payload);
    let resp = self.cache.fetch(req).await?;
    decode(classified(resp)?)
  }

  /// Origin of the API host, for storage endpoints that live outside the
  /// REST path.
  fn origin(&self) -> Result<Url> {
    let mut origin = self.base.clone();
    origin.set_path("/");
    origin.set_query(None);
    Ok(origin)
  }
}

impl<T: HttpTransport> RemoteApi for ApiClient<T> {
  async fn ping(&self) -> bool {
    let Ok(url) = self.endpoint("payments") else {
      return false;
    };
    match self.cache.fetch(self.request(&url)).await {
      Ok(resp) => resp.source == ResponseSource::Network,
      Err(_) => false,
    }
  }

  async fn create_payment(&self, payment: &NewPayment) -> Result<Payment> {
    let url = self.endpoint("payments")?;
    self.write_json(Method::Post, url, payment).await
  }

  async fn update_payment(&self, id: &str, payment: &NewPayment) -> Result<Payment> {
    let url = self.endpoint(&format!("payments/{}", id))?;
    self.write_json(Method::Patch, url, payment).await
  }

  async fn delete_payment(&self, id: &str) -> Result<()> {
    let url = self.endpoint(&format!("payments/{}", id))?;
    let req = HttpRequest {
      method: Method::Delete,
      ..self.request(&url)
    };
    let resp = self.cache.fetch(req).await?;
    classified(resp).map(|_| ())
  }

  async fn list_payments(&self) -> Result<Vec<Payment>> {
    let url = self.endpoint("payments")?;
    self.read_json(url).await
  }

  async fn create_suborganizer(&self, suborganizer: &NewSuborganizer) -> Result<Suborganizer> {
    let url = self.endpoint("suborganizers")?;
    self.write_json(Method::Post, url, suborganizer).await
  }

  async fn update_suborganizer(&self, id: &str, suborganizer: &NewSuborganizer) -> Result<Suborganizer> {
    let url = self.endpoint(&format!("suborganizers/{}", id))?;
    self.write_json(Method::Patch, url, suborganizer).await
  }

  async fn delete_suborganizer(&self, id: &str) -> Result<()> {
    let url = self.endpoint(&format!("suborganizers/{}", id))?;
    let req = HttpRequest {
      method: Method::Delete,
      ..self.request(&url)
    };
    let resp = self.cache.fetch(req).await?;
    classified(resp).map(|_| ())
  }

  async fn list_suborganizers(&self) -> Result<Vec<Suborganizer>> {
    let url = self.endpoint("suborganizers")?;
    self.read_json(url).await
  }

  async fn upload_image(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<String> {
    let origin = self.origin()?;
    let upload = origin
      .join(&format!("storage/v1/object/{}/{}", RECEIPT_BUCKET, key))
      .map_err(|e| Error::Validation(format!("bad object key '{}': {}", key, e)))?;

    let mut req = self.request(&upload);
    req.method = Method::Post;
    req.body = Some(bytes.to_vec());
    req.content_type = Some(content_type.to_string());
    let resp = self.cache.fetch(req).await?;
    classified(resp)?;

    let public = origin
      .join(&format!("storage/v1/object/public/{}/{}", RECEIPT_BUCKET, key))
      .map_err(|e| Error::Validation(format!("bad object key '{}': {}", key, e)))?;
    debug!(key, url = %public, "image uploaded");
    Ok(public.to_string())
  }
}

/// Map a response to the error taxonomy. Synthetic responses mean the network
/// was unreachable and nothing was stored, so they classify as retryable.
fn classified(resp: FetchResponse) -> Result<FetchResponse> {
  if resp.source == ResponseSource::Synthetic {
    return Err(Error::Network(format!("offline: {}", resp.url)));
  }
  match resp.status {
    200..=299 => Ok(resp),
    400..=499 => Err(Error::Validation(format!(
      "{} rejected ({}): {}",
      resp.url,
      resp.status,
      String::from_utf8_lossy(&resp.body),
    ))),
    status => Err(Error::Network(format!("{} returned {}", resp.url, status))),
  }
}

fn decode<R: DeserializeOwned>(resp: FetchResponse) -> Result<R> {
  serde_json::from_slice(&resp.body).map_err(|e| {
    Error::Validation(format!("unexpected response body from {}: {}", resp.url, e))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::Store;
  use std::collections::VecDeque;
  use std::sync::{Arc, Mutex};

  struct FakeTransport {
    script: Mutex<VecDeque<Result<FetchResponse>>>,
    seen: Mutex<Vec<HttpRequest>>,
  }

  impl FakeTransport {
    fn new(script: Vec<Result<FetchResponse>>) -> Self {
      Self {
        script: Mutex::new(script.into()),
        seen: Mutex::new(Vec::new()),
      }
    }
  }

  impl HttpTransport for FakeTransport {
    async fn execute(&self, req: &HttpRequest) -> Result<FetchResponse> {
      self.seen.lock().unwrap().push(req.clone());
      match self.script.lock().unwrap().pop_front() {
        Some(Ok(mut resp)) => {
          resp.url = req.url.clone();
          Ok(resp)
        }
        Some(Err(e)) => Err(e),
        None => Err(Error::Network("script exhausted".into())),
      }
    }
  }

  fn client(
    script: Vec<Result<FetchResponse>>,
  ) -> (ApiClient<FakeTransport>, Arc<FakeTransport>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    store.initialize_schema().unwrap();
    let transport = Arc::new(FakeTransport::new(script));
    let base = Url::parse("https://api.example.com/rest/v1").unwrap();
    let cache = CacheLayer::new(store, Arc::clone(&transport), base.clone(), 30);
    (
      ApiClient::new(cache, base, Some("token".into())),
      transport,
    )
  }

  fn json_response(status: u16, body: &str) -> Result<FetchResponse> {
    Ok(FetchResponse {
      url: String::new(),
      status,
      content_type: "application/json".into(),
      body: body.as_bytes().to_vec(),
      source: ResponseSource::Network,
    })
  }

  fn sample_payment_json(id: &str) -> String {
    format!(
      r#"{{"id":"{}","suborganizer_id":"s1","date":"2025-06-01","amount":500.0,
          "purpose":"Pesticides","payment_mode":"Cash",
          "created_at":"2025-06-01T00:00:00Z","updated_at":"2025-06-01T00:00:00Z"}}"#,
      id
    )
  }

  #[tokio::test]
  async fn test_create_payment_posts_to_endpoint() {
    let (client, transport) = client(vec![json_response(201, &sample_payment_json("p1"))]);
    let payment = NewPayment {
      suborganizer_id: "s1".into(),
      date: "2025-06-01".into(),
      amount: 500.0,
      purpose: "Pesticides".into(),
      payment_mode: "Cash".into(),
      bill_receipt_url: None,
      payment_screenshot_url: None,
      notes: None,
    };

    let created = client.create_payment(&payment).await.unwrap();
    assert_eq!(created.id, "p1");

    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen[0].method, Method::Post);
    assert_eq!(seen[0].url, "https://api.example.com/rest/v1/payments");
    assert_eq!(seen[0].bearer.as_deref(), Some("token"));
  }

  #[tokio::test]
  async fn test_rejection_maps_to_validation_error() {
    let (client, _) = client(vec![json_response(422, r#"{"message":"bad amount"}"#)]);
    let err = client.list_payments().await.unwrap_err();
    // 422 comes back as Ok from the transport but must classify terminal.
    assert!(matches!(err, Error::Validation(_)));
    assert!(!err.is_retryable());
  }

  #[tokio::test]
  async fn test_offline_synthetic_maps_to_network_error() {
    let (client, _) = client(vec![Err(Error::Network("connection refused".into()))]);
    let payment = NewPayment {
      suborganizer_id: "s1".into(),
      date: "2025-06-01".into(),
      amount: 500.0,
      purpose: "Pesticides".into(),
      payment_mode: "Cash".into(),
      bill_receipt_url: None,
      payment_screenshot_url: None,
      notes: None,
    };
    let err = client.create_payment(&payment).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn test_upload_image_returns_public_url() {
    let (client, transport) = client(vec![json_response(200, "{}")]);
    let url = client
      .upload_image("r1.jpg", "image/jpeg", &[0xff, 0xd8])
      .await
      .unwrap();
    assert_eq!(
      url,
      "https://api.example.com/storage/v1/object/public/receipts/r1.jpg"
    );

    let seen = transport.seen.lock().unwrap();
    assert_eq!(
      seen[0].url,
      "https://api.example.com/storage/v1/object/receipts/r1.jpg"
    );
    assert_eq!(seen[0].method, Method::Post);
    assert_eq!(seen[0].content_type.as_deref(), Some("image/jpeg"));
  }

  #[tokio::test]
  async fn test_ping_reports_offline() {
    let (client, _) = client(vec![Err(Error::Network("down".into()))]);
    assert!(!client.ping().await);
  }
}
