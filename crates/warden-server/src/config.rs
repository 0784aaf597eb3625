//! Server configuration: an optional TOML file layered with `WARDEN_*`
//! environment variables.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use warden_core::ServiceConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                    String,
  pub port:                    u16,
  /// Public origin, used to build invitation links.
  pub base_url:                String,
  pub store_path:              PathBuf,
  pub default_per_page:        u64,
  pub invitation_ttl_hours:    i64,
  /// Initial super admin, created on startup when absent.
  pub bootstrap_name:          Option<String>,
  pub bootstrap_email:         Option<String>,
  /// argon2 PHC string; see `--hash-password`.
  pub bootstrap_password_hash: Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                    "127.0.0.1".to_owned(),
      port:                    8080,
      base_url:                "http://localhost:8080".to_owned(),
      store_path:              PathBuf::from("warden.db"),
      default_per_page:        10,
      invitation_ttl_hours:    24,
      bootstrap_name:          None,
      bootstrap_email:         None,
      bootstrap_password_hash: None,
    }
  }
}

impl ServerConfig {
  /// Read `path` (if it exists), then apply `WARDEN_*` overrides.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("WARDEN").try_parsing(true))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// `store_path` with a leading `~` expanded to the home directory.
  pub fn store_path(&self) -> PathBuf {
    let s = self.store_path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.store_path.clone()
  }

  pub fn service_config(&self) -> ServiceConfig {
    ServiceConfig {
      default_per_page: self.default_per_page,
      invitation_ttl:   Duration::hours(self.invitation_ttl_hours),
      accept_url_base:  format!("{}/invitations/", self.base_url.trim_end_matches('/')),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn missing_keys_fall_back_to_defaults() {
    let cfg = from_toml("port = 9000\nbase_url = \"https://admin.example.com/\"");
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.default_per_page, 10);
    assert!(cfg.bootstrap_email.is_none());

    let service = cfg.service_config();
    assert_eq!(service.accept_url_base, "https://admin.example.com/invitations/");
    assert_eq!(service.invitation_ttl, Duration::hours(24));
  }

  #[test]
  fn relative_store_paths_are_untouched() {
    let cfg = from_toml("store_path = \"data/warden.db\"");
    assert_eq!(cfg.store_path(), PathBuf::from("data/warden.db"));
  }
}
