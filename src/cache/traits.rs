//! Core traits and types for the cache stores.

use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::net::{Request, Response};

/// A response read back from a named cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// Absolute URL of the request the entry was stored under
  pub url: String,
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Named request → response caches.
///
/// Caches are created on first write (or `open`) and live until deleted.
/// Writing an existing key overwrites it; the last write wins.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the named cache if it doesn't exist yet.
  fn open(&self, cache: &str) -> Result<()>;

  /// Names of every existing cache, in creation order.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Delete a cache and all its entries. Returns whether it existed.
  fn delete_cache(&self, cache: &str) -> Result<bool>;

  /// Look up the entry stored for this request.
  fn match_request(&self, cache: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store one entry, creating the cache if needed.
  fn put(&self, cache: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store a batch of entries atomically: either all land or none do.
  fn put_all(&self, cache: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// URLs stored in a cache.
  fn keys(&self, cache: &str) -> Result<Vec<String>>;
}

/// Small persisted key → JSON text store, owned jointly with the application.
pub trait StateStore: Send + Sync + 'static {
  fn get_state(&self, key: &str) -> Result<Option<String>>;

  fn set_state(&self, key: &str, value: &str) -> Result<()>;

  fn remove_state(&self, key: &str) -> Result<()>;

  /// Read-modify-write a key without interleaving other writers.
  /// Returning `None` from `f` removes the key.
  fn update_state<G>(&self, key: &str, f: G) -> Result<()>
  where
    G: FnOnce(Option<String>) -> Result<Option<String>>;
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cached entry served first; a background refresh may be in flight
  Cache,
  /// Network unavailable, serving a previously cached entry
  Offline,
  /// Network unavailable and nothing cached, serving a synthesized placeholder
  Fallback,
}

/// A response together with its provenance.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: CacheSource,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
    }
  }

  pub fn from_cache(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Cache,
    }
  }

  pub fn offline(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Offline,
    }
  }

  pub fn fallback(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Fallback,
    }
  }
}
