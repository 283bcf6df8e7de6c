//! Test doubles shared by the worker tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::cache::{CacheStorage, CachedResponse, SqliteStorage, StateStore};
use crate::config::Config;
use crate::net::{Fetcher, Request, Response};
use crate::worker::Worker;

type Predicate = Box<dyn Fn(&Request) -> bool + Send + Sync>;

/// Scripted network. Paths without a scripted response are unreachable.
#[derive(Default)]
pub struct FakeFetcher {
  routes: Mutex<HashMap<String, Response>>,
  failing: Mutex<HashSet<String>>,
  predicates: Mutex<Vec<Predicate>>,
  gates: Mutex<HashMap<String, Arc<Notify>>>,
  requests: Mutex<Vec<Request>>,
  offline: AtomicBool,
}

impl FakeFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Answer requests for `path` with `response`.
  pub fn respond(&self, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), response);
  }

  /// Make `path` unreachable even if a response is scripted.
  pub fn fail(&self, path: &str) {
    self.failing.lock().unwrap().insert(path.to_string());
  }

  /// Make any request matching `predicate` unreachable.
  pub fn fail_when(&self, predicate: impl Fn(&Request) -> bool + Send + Sync + 'static) {
    self.predicates.lock().unwrap().push(Box::new(predicate));
  }

  /// Hold the next request for `path` until the returned gate is notified.
  pub fn gate(&self, path: &str) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    self
      .gates
      .lock()
      .unwrap()
      .insert(path.to_string(), Arc::clone(&gate));
    gate
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  /// Every request seen so far.
  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl Fetcher for FakeFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.requests.lock().unwrap().push(request.clone());
    let path = request.path().to_string();

    let gate = self.gates.lock().unwrap().remove(&path);
    if let Some(gate) = gate {
      gate.notified().await;
    }

    let unreachable = self.offline.load(Ordering::SeqCst)
      || self.failing.lock().unwrap().contains(&path)
      || self.predicates.lock().unwrap().iter().any(|p| p(request));
    if unreachable {
      return Err(eyre!("network unreachable: {}", request.url));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(&path)
      .cloned()
      .ok_or_else(|| eyre!("connection refused: {}", request.url))
  }
}

/// Store whose cache lookups always fail. Everything else goes to an
/// in-memory SQLite store.
pub struct BrokenLookups {
  inner: SqliteStorage,
}

impl BrokenLookups {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
    }
  }
}

impl CacheStorage for BrokenLookups {
  fn open(&self, cache: &str) -> Result<()> {
    self.inner.open(cache)
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    self.inner.cache_names()
  }

  fn delete_cache(&self, cache: &str) -> Result<bool> {
    self.inner.delete_cache(cache)
  }

  fn match_request(&self, cache: &str, _request: &Request) -> Result<Option<CachedResponse>> {
    Err(eyre!("disk I/O error reading {}", cache))
  }

  fn put(&self, cache: &str, request: &Request, response: &Response) -> Result<()> {
    self.inner.put(cache, request, response)
  }

  fn put_all(&self, cache: &str, entries: &[(Request, Response)]) -> Result<()> {
    self.inner.put_all(cache, entries)
  }

  fn keys(&self, cache: &str) -> Result<Vec<String>> {
    self.inner.keys(cache)
  }
}

impl StateStore for BrokenLookups {
  fn get_state(&self, key: &str) -> Result<Option<String>> {
    self.inner.get_state(key)
  }

  fn set_state(&self, key: &str, value: &str) -> Result<()> {
    self.inner.set_state(key, value)
  }

  fn remove_state(&self, key: &str) -> Result<()> {
    self.inner.remove_state(key)
  }

  fn update_state<G>(&self, key: &str, f: G) -> Result<()>
  where
    G: FnOnce(Option<String>) -> Result<Option<String>>,
  {
    self.inner.update_state(key, f)
  }
}

pub fn test_config() -> Config {
  Config {
    origin: "http://journal.test".to_string(),
    ..Config::default()
  }
}

/// Worker over an in-memory store and the given fake network.
pub fn harness(
  fetcher: FakeFetcher,
) -> (
  Worker<SqliteStorage, FakeFetcher>,
  Arc<SqliteStorage>,
  Arc<FakeFetcher>,
) {
  harness_with(test_config(), fetcher)
}

pub fn harness_with(
  config: Config,
  fetcher: FakeFetcher,
) -> (
  Worker<SqliteStorage, FakeFetcher>,
  Arc<SqliteStorage>,
  Arc<FakeFetcher>,
) {
  let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
  let fetcher = Arc::new(fetcher);
  let worker = Worker::current(Arc::clone(&storage), Arc::clone(&fetcher), Arc::new(config));
  (worker, storage, fetcher)
}

pub fn get_request<S, F>(worker: &Worker<S, F>, path: &str) -> Request {
  Request::get(worker.config().resolve(path).unwrap())
}

/// A navigation request as a browser sends it.
pub fn page_request<S, F>(worker: &Worker<S, F>, path: &str) -> Request {
  get_request(worker, path).with_header(
    "accept",
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
  )
}

pub fn asset_request<S, F>(worker: &Worker<S, F>, path: &str, accept: &str) -> Request {
  get_request(worker, path).with_header("accept", accept)
}
