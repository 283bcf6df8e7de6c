//! Cache-versus-network strategies for the three request lanes.
//!
//! - API: network first, then the dynamic cache, then a JSON placeholder
//! - Page: cache first with a background refresh, then network, then the offline page
//! - Static: like page, with placeholders chosen by asset type

use color_eyre::eyre::eyre;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use super::offline::offline_page;
use super::Worker;
use crate::cache::{CacheStorage, CachedResponse, Served, StateStore};
use crate::net::{Fetcher, Request, Response};

/// Message returned by the API placeholder when nothing is cached.
pub const API_OFFLINE_MESSAGE: &str =
  "You are offline. Reflections will load when your connection returns.";

/// Asset type, used to pick a placeholder when an asset can't be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
  Stylesheet,
  Script,
  Other,
}

impl AssetKind {
  /// Detect from the URL extension first, then from the Accept header.
  pub fn of(request: &Request) -> Self {
    let path = request.path().to_ascii_lowercase();
    if path.ends_with(".css") {
      return Self::Stylesheet;
    }
    if path.ends_with(".js") || path.ends_with(".mjs") {
      return Self::Script;
    }

    match request.accept() {
      Some(accept) if accept.contains("text/css") => Self::Stylesheet,
      Some(accept) if accept.contains("javascript") => Self::Script,
      _ => Self::Other,
    }
  }

  /// Placeholder served when the asset is neither cached nor reachable.
  /// Styles and scripts get an empty 200 body so the page still renders.
  pub fn placeholder(self) -> Response {
    match self {
      Self::Stylesheet => Response::text(
        200,
        "text/css",
        "/* Stylesheet unavailable offline */",
      ),
      Self::Script => Response::text(
        200,
        "application/javascript",
        "// Script unavailable offline",
      ),
      Self::Other => Response::text(
        408,
        "text/plain; charset=utf-8",
        "Resource not available offline",
      ),
    }
  }
}

/// Soft-degrade body for API reads: always 200, never an error.
pub fn api_offline_response() -> Response {
  Response::json(
    200,
    &json!({
      "message": API_OFFLINE_MESSAGE,
      "reflections": [],
    }),
  )
}

impl<S, F> Worker<S, F>
where
  S: CacheStorage + StateStore,
  F: Fetcher,
{
  /// Network first; on network failure serve the dynamic cache, then the placeholder.
  pub(crate) async fn handle_api(&self, request: Request) -> Served {
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_detached(&self.names.dynamic, &request, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "API network request failed");
        match self.lookup(&self.names.dynamic, &request) {
          Some(cached) => Served::offline(cached.response),
          None => Served::fallback(api_offline_response()),
        }
      }
    }
  }

  /// Cache first; the offline page when nothing else works.
  pub(crate) async fn handle_page(&self, request: Request) -> Served {
    match self.cache_first(request).await {
      Ok(served) => served,
      Err(request) => {
        debug!(url = %request.url, "serving offline page");
        Served::fallback(offline_page())
      }
    }
  }

  /// Cache first; a typed placeholder when nothing else works.
  pub(crate) async fn handle_static(&self, request: Request) -> Served {
    match self.cache_first(request).await {
      Ok(served) => served,
      Err(request) => {
        let kind = AssetKind::of(&request);
        debug!(url = %request.url, kind = ?kind, "serving asset placeholder");
        Served::fallback(kind.placeholder())
      }
    }
  }

  /// Shared cache-first shape. A hit is returned at once while a detached
  /// refresh updates the entry; a miss goes to the network. Hands the
  /// request back when both fail.
  async fn cache_first(&self, request: Request) -> Result<Served, Request> {
    if let Some(cached) = self.lookup(&self.names.static_assets, &request) {
      self.refresh_detached(&request);
      return Ok(Served::from_cache(cached.response));
    }

    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_detached(&self.names.static_assets, &request, &response);
        }
        Ok(Served::from_network(response))
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "not cached and network unavailable");
        Err(request)
      }
    }
  }

  /// Cache lookup on the request path; storage errors count as a miss.
  fn lookup(&self, cache: &str, request: &Request) -> Option<CachedResponse> {
    match self.storage.match_request(cache, request) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(cache, url = %request.url, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Write a copy of `response` without waiting for the write.
  fn store_detached(&self, cache: &str, request: &Request, response: &Response) {
    let storage = Arc::clone(&self.storage);
    let cache = cache.to_string();
    let request = request.clone();
    let response = response.clone();

    self
      .background
      .spawn("cache-put", request.url.to_string(), async move {
        storage.put(&cache, &request, &response)
      });
  }

  /// Re-fetch `request` in the background and overwrite its static entry.
  fn refresh_detached(&self, request: &Request) {
    let storage = Arc::clone(&self.storage);
    let fetcher = Arc::clone(&self.fetcher);
    let cache = self.names.static_assets.clone();
    let request = request.clone();

    self
      .background
      .spawn("background-refresh", request.url.to_string(), async move {
        let response = fetcher.fetch(&request).await?;
        if !response.is_success() {
          return Err(eyre!("refresh returned status {}", response.status));
        }
        storage.put(&cache, &request, &response)
      });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::testing::{
    asset_request, get_request, harness, page_request, test_config, BrokenLookups, FakeFetcher,
  };
  use std::time::Duration;

  #[tokio::test]
  async fn test_api_live_response_is_returned_and_cached() {
    let fetcher = FakeFetcher::new();
    fetcher.respond(
      "/api/reflections",
      Response::json(200, &json!([{"reflection": "learned rust"}])),
    );
    let (worker, storage, _) = harness(fetcher);
    let request = get_request(&worker, "/api/reflections");

    let served = worker.handle_api(request.clone()).await;
    worker.settle().await;

    assert_eq!(served.source, CacheSource::Network);
    assert!(served.response.body_text().contains("learned rust"));
    let cached = storage
      .match_request(&worker.names.dynamic, &request)
      .unwrap()
      .unwrap();
    assert_eq!(cached.response, served.response);
  }

  #[tokio::test]
  async fn test_api_error_status_is_returned_but_not_cached() {
    let fetcher = FakeFetcher::new();
    fetcher.respond("/api/reflections", Response::new(500, "boom"));
    let (worker, storage, _) = harness(fetcher);
    let request = get_request(&worker, "/api/reflections");

    let served = worker.handle_api(request.clone()).await;
    worker.settle().await;

    assert_eq!(served.response.status, 500);
    assert!(storage
      .match_request(&worker.names.dynamic, &request)
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_api_offline_serves_cached_copy() {
    let (worker, storage, _) = harness(FakeFetcher::new());
    let request = get_request(&worker, "/api/reflections");
    let cached = Response::json(200, &json!([{"reflection": "cached"}]));
    storage
      .put(&worker.names.dynamic, &request, &cached)
      .unwrap();

    let served = worker.handle_api(request).await;

    assert_eq!(served.source, CacheSource::Offline);
    assert_eq!(served.response, cached);
  }

  #[tokio::test]
  async fn test_api_offline_without_cache_soft_degrades() {
    let (worker, _, _) = harness(FakeFetcher::new());

    let served = worker
      .handle_api(get_request(&worker, "/api/reflections"))
      .await;

    assert_eq!(served.source, CacheSource::Fallback);
    assert_eq!(served.response.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&served.response.body).unwrap();
    assert!(body["message"].is_string());
    assert_eq!(body["reflections"], json!([]));
  }

  #[tokio::test]
  async fn test_page_hit_returns_without_waiting_for_refresh() {
    let fetcher = FakeFetcher::new();
    fetcher.respond("/journal", Response::html("fresh"));
    let gate = fetcher.gate("/journal");
    let (worker, storage, fetcher) = harness(fetcher);
    let request = page_request(&worker, "/journal");
    let stale = Response::html("stale");
    storage
      .put(&worker.names.static_assets, &request, &stale)
      .unwrap();

    // The refresh is blocked on the gate, so this only completes if the
    // handler doesn't wait for it.
    let served = tokio::time::timeout(Duration::from_secs(1), worker.handle_page(request.clone()))
      .await
      .expect("cache hit must not wait on the network");

    assert_eq!(served.source, CacheSource::Cache);
    assert_eq!(served.response, stale);
    assert_eq!(worker.background.pending(), 1);

    gate.notify_one();
    worker.settle().await;

    assert_eq!(fetcher.requests().len(), 1);
    let refreshed = storage
      .match_request(&worker.names.static_assets, &request)
      .unwrap()
      .unwrap();
    assert_eq!(refreshed.response.body_text(), "fresh");
  }

  #[tokio::test]
  async fn test_page_refresh_failure_keeps_cached_entry() {
    let (worker, storage, _) = harness(FakeFetcher::new());
    let request = page_request(&worker, "/about");
    storage
      .put(&worker.names.static_assets, &request, &Response::html("about"))
      .unwrap();

    let served = worker.handle_page(request.clone()).await;
    worker.settle().await;

    assert_eq!(served.response.body_text(), "about");
    let cached = storage
      .match_request(&worker.names.static_assets, &request)
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body_text(), "about");
  }

  #[tokio::test]
  async fn test_page_miss_fetches_and_stores() {
    let fetcher = FakeFetcher::new();
    fetcher.respond("/projects", Response::html("projects"));
    let (worker, storage, _) = harness(fetcher);
    let request = page_request(&worker, "/projects");

    let served = worker.handle_page(request.clone()).await;
    worker.settle().await;

    assert_eq!(served.source, CacheSource::Network);
    assert!(storage
      .match_request(&worker.names.static_assets, &request)
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_page_total_failure_serves_offline_page() {
    let (worker, _, _) = harness(FakeFetcher::new());

    let served = worker.handle_page(page_request(&worker, "/journal")).await;

    assert_eq!(served.source, CacheSource::Fallback);
    assert_eq!(served.response.status, 200);
    assert!(served.response.body_text().contains("You're offline"));
  }

  #[tokio::test]
  async fn test_static_total_failure_placeholders() {
    let (worker, _, _) = harness(FakeFetcher::new());

    let css = worker
      .handle_static(asset_request(&worker, "/static/css/style.css", "text/css"))
      .await;
    let js = worker
      .handle_static(asset_request(&worker, "/static/js/script.js", "*/*"))
      .await;
    let image = worker
      .handle_static(asset_request(&worker, "/static/icons/icon.png", "image/*"))
      .await;

    assert_eq!(css.response.status, 200);
    assert_eq!(css.response.content_type(), Some("text/css"));
    assert_eq!(js.response.status, 200);
    assert_eq!(js.response.content_type(), Some("application/javascript"));
    assert_eq!(image.response.status, 408);
    assert_eq!(image.response.body_text(), "Resource not available offline");
  }

  #[tokio::test]
  async fn test_static_hit_served_from_cache_then_refreshed() {
    let fetcher = FakeFetcher::new();
    fetcher.respond(
      "/static/css/style.css",
      Response::text(200, "text/css", "body { color: blue; }"),
    );
    let (worker, storage, fetcher) = harness(fetcher);
    let request = asset_request(&worker, "/static/css/style.css", "text/css");
    let css = Response::text(200, "text/css", "body { color: red; }");
    storage
      .put(&worker.names.static_assets, &request, &css)
      .unwrap();

    let served = worker.handle_static(request.clone()).await;
    worker.settle().await;

    assert_eq!(served.source, CacheSource::Cache);
    assert_eq!(served.response, css);
    assert_eq!(fetcher.requests().len(), 1);
    let refreshed = storage
      .match_request(&worker.names.static_assets, &request)
      .unwrap()
      .unwrap();
    assert_eq!(refreshed.response.body_text(), "body { color: blue; }");
  }

  #[tokio::test]
  async fn test_failed_lookup_counts_as_miss() {
    let fetcher = FakeFetcher::new();
    fetcher.respond("/journal", Response::html("journal"));
    let worker = Worker::current(
      Arc::new(BrokenLookups::new()),
      Arc::new(fetcher),
      Arc::new(test_config()),
    );

    let page = worker.handle_page(page_request(&worker, "/journal")).await;
    let api = worker
      .handle_api(get_request(&worker, "/api/reflections"))
      .await;
    let image = worker
      .handle_static(asset_request(&worker, "/static/icons/icon.png", "image/*"))
      .await;
    worker.settle().await;

    assert_eq!(page.source, CacheSource::Network);
    assert_eq!(page.response.body_text(), "journal");
    assert_eq!(api.source, CacheSource::Fallback);
    assert_eq!(api.response.status, 200);
    assert_eq!(image.source, CacheSource::Fallback);
    assert_eq!(image.response.status, 408);
  }

  #[test]
  fn test_asset_kind_from_accept_header() {
    let url = url::Url::parse("http://journal.test/bundle").unwrap();
    let css = Request::get(url.clone()).with_header("accept", "text/css,*/*;q=0.1");
    let js = Request::get(url.clone()).with_header("accept", "application/javascript");
    assert_eq!(AssetKind::of(&css), AssetKind::Stylesheet);
    assert_eq!(AssetKind::of(&js), AssetKind::Script);
    assert_eq!(AssetKind::of(&Request::get(url)), AssetKind::Other);
  }
}
