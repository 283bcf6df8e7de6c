//! Periodic refresh of the main pages in the static cache.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use tracing::{info, warn};

use super::Worker;
use crate::cache::{CacheStorage, StateStore};
use crate::net::{Fetcher, Request};

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
  pub refreshed: Vec<String>,
  /// Path and reason for every page that couldn't be refreshed
  pub failed: Vec<(String, String)>,
}

impl<S, F> Worker<S, F>
where
  S: CacheStorage + StateStore,
  F: Fetcher,
{
  /// Re-fetch every configured page. Each page is fetched and stored on its
  /// own; one failure doesn't stop the others.
  pub(crate) async fn refresh_content(&self) -> RefreshReport {
    let results = join_all(
      self
        .config
        .refresh_pages
        .iter()
        .map(|path| async move { (path.clone(), self.refresh_page(path).await) }),
    )
    .await;

    let mut report = RefreshReport::default();
    for (path, result) in results {
      match result {
        Ok(()) => {
          info!(path = %path, "refreshed page");
          report.refreshed.push(path);
        }
        Err(e) => {
          warn!(path = %path, error = %e, "failed to refresh page");
          report.failed.push((path, e.to_string()));
        }
      }
    }
    report
  }

  async fn refresh_page(&self, path: &str) -> Result<()> {
    let request = Request::get(self.config.resolve(path)?);
    let response = self.fetcher.fetch(&request).await?;
    if !response.is_success() {
      return Err(eyre!("status {}", response.status));
    }
    self
      .storage
      .put(&self.names.static_assets, &request, &response)
  }
}
