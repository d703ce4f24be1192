//! Configuration: YAML file plus environment overrides read once at startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the remote data API.
  pub url: String,
}

/// Tunables for the offline subsystem. All of these can be overridden by
/// environment variables and are static for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// Maximum accepted upload size in megabytes.
  pub max_upload_mb: u64,
  /// JPEG re-encode quality, 0..=1.
  pub image_quality: f32,
  /// Images wider than this are downscaled before upload (pixels).
  pub image_max_width: u32,
  /// Replay attempts before a queue item is terminally failed.
  pub sync_retry_limit: u32,
  /// Cached images older than this many days may be pruned.
  pub cache_retention_days: i64,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      max_upload_mb: 5,
      image_quality: 0.8,
      image_max_width: 1024,
      sync_retry_limit: 3,
      cache_retention_days: 30,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./seedledger.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/seedledger/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Validation(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(Error::Validation(
          "no configuration file found; create one at ~/.config/seedledger/config.yaml".into(),
        ))
      }
    };

    config.offline.apply_env_overrides();
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("seedledger.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("seedledger").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| Error::Validation(format!("failed to read {}: {}", path.display(), e)))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| Error::Validation(format!("failed to parse {}: {}", path.display(), e)))
  }

  /// Get the API token from the environment, if the backend requires one.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SEEDLEDGER_API_TOKEN").ok()
  }
}

impl OfflineConfig {
  /// Environment variables win over file values. Unparseable values are
  /// ignored with a trace so a typo degrades to the configured default.
  fn apply_env_overrides(&mut self) {
    override_from_env("SEEDLEDGER_MAX_UPLOAD_MB", &mut self.max_upload_mb);
    override_from_env("SEEDLEDGER_IMAGE_QUALITY", &mut self.image_quality);
    override_from_env("SEEDLEDGER_IMAGE_MAX_WIDTH", &mut self.image_max_width);
    override_from_env("SEEDLEDGER_SYNC_RETRY_LIMIT", &mut self.sync_retry_limit);
    override_from_env(
      "SEEDLEDGER_CACHE_RETENTION_DAYS",
      &mut self.cache_retention_days,
    );
  }
}

fn override_from_env<T: std::str::FromStr>(name: &str, target: &mut T) {
  if let Ok(raw) = std::env::var(name) {
    match raw.parse() {
      Ok(value) => *target = value,
      Err(_) => tracing::warn!(%name, %raw, "ignoring unparseable environment override"),
    }
  }
}
