//! Network request cache layer.
//!
//! Sits between the application and the network, applying one strategy per
//! request class: network-first for the remote data API, cache-first for
//! images and static assets. Network failures surface as stored copies or
//! synthetic offline responses, never as unhandled faults.

mod layer;
mod transport;

pub use layer::{CacheLayer, RequestClass, API_CACHE, PRECACHE_MANIFEST, STATIC_CACHE};
pub use transport::{
  FetchResponse, HttpRequest, HttpTransport, Method, ReqwestTransport, ResponseSource,
};
