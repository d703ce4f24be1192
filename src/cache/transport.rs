//! HTTP transport seam.
//!
//! The cache layer and API client speak to the network exclusively through
//! [`HttpTransport`] so strategy and replay logic can be exercised against
//! fakes in tests.

use std::future::Future;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  /// Idempotent reads are the only requests the cache layer may store.
  pub fn is_read(&self) -> bool {
    matches!(self, Method::Get)
  }
}

/// An outbound request as seen by the cache layer.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub body: Option<Vec<u8>>,
  pub content_type: Option<String>,
  pub bearer: Option<String>,
  /// Whether this request represents a full-page navigation (static assets
  /// fall back to the cached root page when it does).
  pub navigation: bool,
}

impl HttpRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      body: None,
      content_type: None,
      bearer: None,
      navigation: false,
    }
  }

  pub fn with_json_body(mut self, method: Method, body: Vec<u8>) -> Self {
    self.method = method;
    self.body = Some(body);
    self.content_type = Some("application/json".into());
    self
  }

  pub fn with_bearer(mut self, token: Option<String>) -> Self {
    self.bearer = token;
    self
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live from the network.
  Network,
  /// Served from a stored copy.
  Cache,
  /// Synthesized locally because the network failed and no copy was stored.
  Synthetic,
}

/// A response as returned by the cache layer.
#[derive(Debug, Clone)]
pub struct FetchResponse {
  pub url: String,
  pub status: u16,
  pub content_type: String,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl FetchResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Executes a request against the real network.
///
/// Implementations return `Err` only for network-level failures; HTTP error
/// statuses come back as `Ok` responses.
pub trait HttpTransport: Send + Sync {
  fn execute(&self, req: &HttpRequest) -> impl Future<Output = Result<FetchResponse>> + Send;
}

/// reqwest-backed transport. Timeouts are short so connectivity probes and
/// offline fallbacks resolve quickly instead of hanging on a dead link.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("seedledger/", env!("CARGO_PKG_VERSION")))
      .connect_timeout(std::time::Duration::from_secs(10))
      .timeout(std::time::Duration::from_secs(30))
      .build()?;
    Ok(Self { client })
  }
}

impl HttpTransport for ReqwestTransport {
  async fn execute(&self, req: &HttpRequest) -> Result<FetchResponse> {
    let mut builder = match req.method {
      Method::Get => self.client.get(&req.url),
      Method::Post => self.client.post(&req.url),
      Method::Patch => self.client.patch(&req.url),
      Method::Delete => self.client.delete(&req.url),
    };

    if let Some(token) = &req.bearer {
      builder = builder.bearer_auth(token);
    }
    if let Some(content_type) = &req.content_type {
      builder = builder.header(reqwest::header::CONTENT_TYPE, content_type.clone());
    }
    if let Some(body) = &req.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or("application/octet-stream")
      .to_string();
    let body = response.bytes().await?.to_vec();

    Ok(FetchResponse {
      url: req.url.clone(),
      status,
      content_type,
      body,
      source: ResponseSource::Network,
    })
  }
}
