//! Runtime configuration, layered from a TOML file and `MUCCA_*` environment
//! variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::Deserialize;

/// Runtime server configuration, deserialised from `mucca.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// Pause between change-feed polls once the feed is drained.
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms:   u64,
  /// Maximum number of change events handed to one enrichment batch.
  #[serde(default = "default_batch_size")]
  pub batch_size:         usize,
  #[serde(default = "default_fetch_timeout_secs")]
  pub fetch_timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent:         String,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("mucca.db") }
fn default_poll_interval_ms() -> u64 { 1_000 }
fn default_batch_size() -> usize { 100 }
fn default_fetch_timeout_secs() -> u64 { 30 }
fn default_user_agent() -> String { format!("mucca/{}", env!("CARGO_PKG_VERSION")) }

impl ServerConfig {
  /// Read `path` (optional) and overlay `MUCCA_*` environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("MUCCA").try_parsing(true))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }

  pub fn fetch_timeout(&self) -> Duration { Duration::from_secs(self.fetch_timeout_secs) }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.store_path, PathBuf::from("mucca.db"));
    assert_eq!(cfg.batch_size, 100);
    assert!(cfg.user_agent.starts_with("mucca/"));
  }

  #[test]
  fn file_values_override_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "port = 9999\nstore_path = \"/tmp/m.db\"\npoll_interval_ms = 250").unwrap();

    let cfg = ServerConfig::load(file.path()).unwrap();
    assert_eq!(cfg.port, 9999);
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/m.db"));
    assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
    assert_eq!(cfg.host, "127.0.0.1");
  }
}
