//! Error taxonomy for the offline sync core.
//!
//! The split matters for recovery: storage failures abort the attempted
//! operation but leave the rest of the app running, network failures fall
//! back to cache (reads) or the sync queue (writes), and validation failures
//! are terminal and must never be retried.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// Durable store unavailable or schema not initialized.
  #[error("storage: {0}")]
  Storage(String),

  /// Remote call failed at the network level (transport error or 5xx).
  #[error("network: {0}")]
  Network(String),

  /// A queued item exhausted its retries or failed terminally during replay.
  #[error("sync replay failed for {id} after {retries} attempt(s): {reason}")]
  Replay {
    id: String,
    retries: u32,
    reason: String,
  },

  /// Payload rejected by the remote API (4xx) or malformed locally.
  #[error("validation: {0}")]
  Validation(String),
}

impl Error {
  /// Whether a replay attempt that produced this error should be retried.
  ///
  /// Network failures are transient; validation failures are permanent and
  /// retrying them would only burn the retry budget.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Error::Network(_) | Error::Storage(_))
  }
}

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self {
    Error::Storage(e.to_string())
  }
}

impl From<reqwest::Error> for Error {
  fn from(e: reqwest::Error) -> Self {
    Error::Network(e.to_string())
  }
}
