use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::event::EventKind;

/// Environment variable that overrides the configured origin.
pub const ORIGIN_ENV: &str = "JCACHE_ORIGIN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the journal application; every manifest path resolves against it
  pub origin: String,
  /// Prefix shared by all cache names (e.g. "learning-journal")
  pub cache_prefix: String,
  /// Current cache version; caches from other versions are purged on activate
  pub version: String,
  /// Path prefix that routes a request to the API lane
  pub api_prefix: String,
  /// Endpoint that queued reflections are POSTed to during background sync
  pub reflections_endpoint: String,
  /// Paths pre-cached at install time (all-or-nothing)
  pub manifest: Vec<String>,
  /// Pages re-fetched by the periodic refresher
  pub refresh_pages: Vec<String>,
  pub sync_tag: String,
  pub periodic_tag: String,
  pub sync_policy: SyncPolicy,
  /// Event kinds the worker registers a listener for; others are ignored
  pub listeners: Vec<EventKind>,
  /// Optional per-request timeout; none by default
  pub request_timeout_secs: Option<u64>,
  pub notifications: NotificationConfig,
  /// SQLite database path (default: $XDG_DATA_HOME/jcache/cache.db)
  pub database: Option<PathBuf>,
  pub log: LogConfig,
}

/// What happens to queued reflections whose delivery failed during a sync pass.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPolicy {
  /// Keep failed entries queued for the next sync (at-least-once)
  #[default]
  RetainFailed,
  /// Clear the whole queue after every pass, failures included (at-most-once)
  DropFailed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "Learning Journal".to_string(),
      body: "You have a new update in your learning journal".to_string(),
      icon: "/static/icons/icon-192x192.png".to_string(),
      badge: "/static/icons/icon-72x72.png".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive, overridden by RUST_LOG
  pub level: String,
  /// Also write logs to this file
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://127.0.0.1:5000".to_string(),
      cache_prefix: "learning-journal".to_string(),
      version: "v1".to_string(),
      api_prefix: "/api/".to_string(),
      reflections_endpoint: "/api/reflections".to_string(),
      manifest: to_strings(&[
        "/",
        "/journal",
        "/about",
        "/projects",
        "/offline",
        "/static/css/style.css",
        "/static/js/script.js",
        "/manifest.json",
      ]),
      refresh_pages: to_strings(&["/", "/journal", "/about", "/projects"]),
      sync_tag: "sync-reflections".to_string(),
      periodic_tag: "update-content".to_string(),
      sync_policy: SyncPolicy::default(),
      listeners: EventKind::ALL.to_vec(),
      request_timeout_secs: None,
      notifications: NotificationConfig::default(),
      database: None,
      log: LogConfig::default(),
    }
  }
}

fn to_strings(paths: &[&str]) -> Vec<String> {
  paths.iter().map(|p| p.to_string()).collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jcache/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("jcache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if !self.api_prefix.starts_with('/') {
      return Err(eyre!(
        "api_prefix must be an absolute path, got '{}'",
        self.api_prefix
      ));
    }
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    Ok(())
  }

  /// Parsed origin URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve an application path (e.g. "/journal") against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
  }

  /// Database location, either configured or under the user data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.database {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("jcache").join("cache.db"))
  }
}
