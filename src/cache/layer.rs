//! Strategy dispatch, synthetic offline responses, and cache lifecycle.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::store::{CachedResponse, Store};

use super::transport::{FetchResponse, HttpRequest, HttpTransport, Method, ResponseSource};

/// Named cache generation for remote-data API responses.
pub const API_CACHE: &str = "api-cache-v1";
/// Named cache generation for static assets.
pub const STATIC_CACHE: &str = "static-cache-v1";
/// Named cache generation for images (held in the image collection).
const IMAGE_CACHE: &str = "image-cache-v1";

/// Root-level assets pre-populated on install.
pub const PRECACHE_MANIFEST: &[&str] = &["/", "/index.html", "/manifest.json", "/favicon.ico"];

/// How a request is classified, which decides its caching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Remote data API: network-first.
  Api,
  /// Image asset: cache-first, never errors.
  Image,
  /// Anything else: cache-first with root-page navigation fallback.
  StaticAsset,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "ico"];

/// Cache layer installed once per application instance.
pub struct CacheLayer<T: HttpTransport> {
  store: Arc<Store>,
  transport: Arc<T>,
  api_base: Url,
  retention_days: i64,
}

impl<T: HttpTransport> CacheLayer<T> {
  pub fn new(store: Arc<Store>, transport: Arc<T>, api_base: Url, retention_days: i64) -> Self {
    Self {
      store,
      transport,
      api_base,
      retention_days,
    }
  }

  /// Classify a request by its URL.
  pub fn classify(&self, url: &str) -> RequestClass {
    if url.starts_with(self.api_base.as_str()) {
      return RequestClass::Api;
    }
    if let Ok(parsed) = Url::parse(url) {
      let path = parsed.path();
      if path.contains("/storage/") {
        return RequestClass::Image;
      }
      if let Some(ext) = path.rsplit('.').next() {
        if IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
          return RequestClass::Image;
        }
      }
    }
    RequestClass::StaticAsset
  }

  /// Handle one request, dispatching on its class. Network failures come
  /// back as stored copies or synthetic responses; only storage failures
  /// surface as errors.
  pub async fn fetch(&self, req: HttpRequest) -> Result<FetchResponse> {
    // Mutations always go network-first and are never cached, whatever
    // class their URL falls in.
    if !req.method.is_read() {
      return self.fetch_api(req).await;
    }
    match self.classify(&req.url) {
      RequestClass::Api => self.fetch_api(req).await,
      RequestClass::Image => self.fetch_image(req).await,
      RequestClass::StaticAsset => self.fetch_static(req).await,
    }
  }

  /// Network-first. Successful idempotent reads are stored by request
  /// identity; mutating requests are never satisfied from cache.
  async fn fetch_api(&self, req: HttpRequest) -> Result<FetchResponse> {
    let key = request_key(req.method, &req.url);

    match self.transport.execute(&req).await {
      Ok(response) => {
        if req.method.is_read() && response.is_success() {
          self.store_copy(API_CACHE, &key, &response)?;
        }
        Ok(response)
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "api request failed, trying cache");
        if req.method.is_read() {
          if let Some(cached) = self.store.get_response(API_CACHE, &key)? {
            return Ok(from_stored(cached));
          }
        }
        Ok(offline_response(&req.url))
      }
    }
  }

  /// Cache-first; never returns an error to the caller for a miss.
  async fn fetch_image(&self, req: HttpRequest) -> Result<FetchResponse> {
    if let Some(asset) = self.store.get_asset(&req.url)? {
      return Ok(FetchResponse {
        url: asset.key,
        status: 200,
        content_type: asset.content_type,
        body: asset.blob,
        source: ResponseSource::Cache,
      });
    }

    match self.transport.execute(&req).await {
      Ok(response) => {
        if response.is_success() {
          self
            .store
            .put_asset(&req.url, &response.body, &response.content_type)?;
        }
        Ok(response)
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "image fetch failed");
        Ok(FetchResponse {
          url: req.url,
          status: 404,
          content_type: "text/plain".into(),
          body: Vec::new(),
          source: ResponseSource::Synthetic,
        })
      }
    }
  }

  /// Cache-first; navigations fall back to the stored root page.
  async fn fetch_static(&self, req: HttpRequest) -> Result<FetchResponse> {
    let key = request_key(req.method, &req.url);
    if let Some(cached) = self.store.get_response(STATIC_CACHE, &key)? {
      return Ok(from_stored(cached));
    }

    match self.transport.execute(&req).await {
      Ok(response) => {
        if response.is_success() {
          self.store_copy(STATIC_CACHE, &key, &response)?;
        }
        Ok(response)
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "static fetch failed");
        if req.navigation {
          let root = self.root_url()?;
          let root_key = request_key(Method::Get, root.as_str());
          if let Some(cached) = self.store.get_response(STATIC_CACHE, &root_key)? {
            return Ok(from_stored(cached));
          }
        }
        Ok(FetchResponse {
          url: req.url,
          status: 503,
          content_type: "text/plain".into(),
          body: b"Offline".to_vec(),
          source: ResponseSource::Synthetic,
        })
      }
    }
  }

  /// Pre-populate the fixed manifest of essential assets. Individual
  /// failures are logged and skipped so install works partially offline.
  pub async fn install(&self) -> Result<()> {
    let root = self.root_url()?;
    for path in PRECACHE_MANIFEST {
      let url = root
        .join(path)
        .map_err(|e| Error::Validation(format!("bad precache path '{}': {}", path, e)))?;
      let req = HttpRequest::get(url.as_str());
      match self.transport.execute(&req).await {
        Ok(response) if response.is_success() => {
          let key = request_key(Method::Get, url.as_str());
          self.store_copy(STATIC_CACHE, &key, &response)?;
        }
        Ok(response) => {
          warn!(url = %url, status = response.status, "precache fetch rejected");
        }
        Err(e) => {
          warn!(url = %url, error = %e, "precache fetch failed");
        }
      }
    }
    Ok(())
  }

  /// Purge every cache generation not in the current named set and prune
  /// images past the retention window. Takes effect immediately.
  pub fn activate(&self) -> Result<()> {
    let purged = self
      .store
      .purge_stale_generations(&[API_CACHE, STATIC_CACHE])?;
    let pruned = self.store.prune_assets(self.retention_days)?;
    debug!(purged, pruned, generation = IMAGE_CACHE, "cache activated");
    Ok(())
  }

  fn root_url(&self) -> Result<Url> {
    let mut root = self.api_base.clone();
    root.set_path("/");
    root.set_query(None);
    Ok(root)
  }

  fn store_copy(&self, cache_name: &str, key: &str, response: &FetchResponse) -> Result<()> {
    self.store.put_response(
      cache_name,
      key,
      &CachedResponse {
        url: response.url.clone(),
        status: response.status,
        content_type: response.content_type.clone(),
        body: response.body.clone(),
        cached_at: Utc::now(),
      },
    )
  }
}

impl<T: HttpTransport> Clone for CacheLayer<T> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      transport: Arc::clone(&self.transport),
      api_base: self.api_base.clone(),
      retention_days: self.retention_days,
    }
  }
}

/// Stable request identity: hash of method and URL.
fn request_key(method: Method, url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(method.as_str().as_bytes());
  hasher.update(b" ");
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

fn from_stored(cached: CachedResponse) -> FetchResponse {
  FetchResponse {
    url: cached.url,
    status: cached.status,
    content_type: cached.content_type,
    body: cached.body,
    source: ResponseSource::Cache,
  }
}

/// Structured offline error body for failed API requests with no stored copy.
fn offline_response(url: &str) -> FetchResponse {
  let body = serde_json::json!({
    "error": "Offline",
    "message": "This request failed and no cached version is available",
  });
  FetchResponse {
    url: url.to_string(),
    status: 503,
    content_type: "application/json".into(),
    body: serde_json::to_vec(&body).unwrap_or_default(),
    source: ResponseSource::Synthetic,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  /// Transport that replays a scripted sequence of outcomes.
  struct FakeTransport {
    script: Mutex<VecDeque<Result<FetchResponse>>>,
    calls: AtomicUsize,
  }

  impl FakeTransport {
    fn new(script: Vec<Result<FetchResponse>>) -> Self {
      Self {
        script: Mutex::new(script.into()),
        calls: AtomicUsize::new(0),
      }
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl HttpTransport for FakeTransport {
    async fn execute(&self, req: &HttpRequest) -> Result<FetchResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);
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

  fn ok_json(body: &str) -> Result<FetchResponse> {
    Ok(FetchResponse {
      url: String::new(),
      status: 200,
      content_type: "application/json".into(),
      body: body.as_bytes().to_vec(),
      source: ResponseSource::Network,
    })
  }

  fn network_down() -> Result<FetchResponse> {
    Err(Error::Network("connection refused".into()))
  }

  fn layer(script: Vec<Result<FetchResponse>>) -> (CacheLayer<FakeTransport>, Arc<FakeTransport>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    store.initialize_schema().unwrap();
    let transport = Arc::new(FakeTransport::new(script));
    let base = Url::parse("https://api.example.com/rest/v1/").unwrap();
    (
      CacheLayer::new(store, Arc::clone(&transport), base, 30),
      transport,
    )
  }

  #[test]
  fn test_classification() {
    let (layer, _) = layer(vec![]);
    assert_eq!(
      layer.classify("https://api.example.com/rest/v1/payments"),
      RequestClass::Api
    );
    assert_eq!(
      layer.classify("https://cdn.example.com/receipts/a.jpg"),
      RequestClass::Image
    );
    assert_eq!(
      layer.classify("https://cdn.example.com/storage/receipts/a"),
      RequestClass::Image
    );
    assert_eq!(
      layer.classify("https://app.example.com/index.html"),
      RequestClass::StaticAsset
    );
  }

  #[tokio::test]
  async fn test_api_read_served_from_cache_after_network_failure() {
    let (layer, _) = layer(vec![ok_json(r#"[{"id":"p1"}]"#), network_down()]);
    let url = "https://api.example.com/rest/v1/payments";

    let live = layer.fetch(HttpRequest::get(url)).await.unwrap();
    assert_eq!(live.source, ResponseSource::Network);

    let replay = layer.fetch(HttpRequest::get(url)).await.unwrap();
    assert_eq!(replay.source, ResponseSource::Cache);
    assert_eq!(replay.status, 200);
    assert_eq!(replay.body, br#"[{"id":"p1"}]"#.to_vec());
  }

  #[tokio::test]
  async fn test_api_failure_without_cache_yields_offline_503() {
    let (layer, _) = layer(vec![network_down()]);
    let resp = layer
      .fetch(HttpRequest::get("https://api.example.com/rest/v1/payments"))
      .await
      .unwrap();

    assert_eq!(resp.status, 503);
    assert_eq!(resp.source, ResponseSource::Synthetic);
    let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(body["error"], "Offline");
  }

  #[tokio::test]
  async fn test_mutations_are_never_satisfied_from_cache() {
    // Cache a GET copy first, then fail a POST to the same URL.
    let (layer, _) = layer(vec![ok_json("[]"), network_down()]);
    let url = "https://api.example.com/rest/v1/payments";
    layer.fetch(HttpRequest::get(url)).await.unwrap();

    let post = HttpRequest::get(url).with_json_body(Method::Post, b"{}".to_vec());
    let resp = layer.fetch(post).await.unwrap();
    assert_eq!(resp.status, 503);
    assert_eq!(resp.source, ResponseSource::Synthetic);
  }

  #[tokio::test]
  async fn test_image_is_cache_first() {
    let (layer, transport) = layer(vec![Ok(FetchResponse {
      url: String::new(),
      status: 200,
      content_type: "image/jpeg".into(),
      body: vec![0xff, 0xd8],
      source: ResponseSource::Network,
    })]);
    let url = "https://cdn.example.com/receipts/a.jpg";

    let first = layer.fetch(HttpRequest::get(url)).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(transport.calls(), 1);

    let second = layer.fetch(HttpRequest::get(url)).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.body, vec![0xff, 0xd8]);
    // No second network call.
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_image_failure_yields_synthetic_not_found() {
    let (layer, _) = layer(vec![network_down()]);
    let resp = layer
      .fetch(HttpRequest::get("https://cdn.example.com/missing.png"))
      .await
      .unwrap();
    assert_eq!(resp.status, 404);
    assert_eq!(resp.source, ResponseSource::Synthetic);
  }

  #[tokio::test]
  async fn test_navigation_falls_back_to_cached_root() {
    // Install succeeds for "/" only, then the navigation fetch fails.
    let (layer, _) = layer(vec![
      ok_json("<html>root</html>"),
      network_down(),
      network_down(),
      network_down(),
      network_down(),
    ]);
    layer.install().await.unwrap();

    let mut req = HttpRequest::get("https://api.example.com/reports");
    req.navigation = true;
    // /reports is under the api base, so use an off-base static URL.
    req.url = "https://app.example.com/reports".into();
    let resp = layer.fetch(req).await.unwrap();
    assert_eq!(resp.source, ResponseSource::Cache);
    assert_eq!(resp.body, b"<html>root</html>".to_vec());
  }
}
