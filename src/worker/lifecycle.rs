//! Install and activate handlers.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::info;

use super::registration::Registration;
use super::Worker;
use crate::cache::{CacheStorage, StateStore};
use crate::net::{Fetcher, Request, Response};

#[derive(Debug, Clone)]
pub struct InstallReport {
  pub version: String,
  /// Cache the manifest was written to
  pub cache: String,
  /// Number of manifest entries stored
  pub cached: usize,
  /// Take over right away instead of waiting for old pages to close
  pub skip_waiting: bool,
}

#[derive(Debug, Clone)]
pub struct ActivateReport {
  pub version: String,
  /// Caches removed because they belong to another version
  pub deleted: Vec<String>,
  pub kept: Vec<String>,
  /// Open pages are controlled by this version immediately
  pub claimed: bool,
}

impl<S, F> Worker<S, F>
where
  S: CacheStorage + StateStore,
  F: Fetcher,
{
  /// Pre-cache the whole manifest. Any failed entry fails the install and
  /// leaves the static cache untouched.
  pub(crate) async fn install(&self) -> Result<InstallReport> {
    let requests = self
      .config
      .manifest
      .iter()
      .map(|path| self.config.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let responses = try_join_all(requests.iter().map(|request| self.fetch_for_install(request)))
      .await
      .map_err(|e| eyre!("Install of {} failed: {}", self.version, e))?;

    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
    self
      .storage
      .put_all(&self.names.static_assets, &entries)
      .map_err(|e| eyre!("Install of {} failed: {}", self.version, e))?;

    Registration::record_installed(&*self.storage, &self.version)?;

    info!(
      version = %self.version,
      cache = %self.names.static_assets,
      entries = entries.len(),
      "installed"
    );

    Ok(InstallReport {
      version: self.version.clone(),
      cache: self.names.static_assets.clone(),
      cached: entries.len(),
      skip_waiting: true,
    })
  }

  async fn fetch_for_install(&self, request: &Request) -> Result<Response> {
    let response = self.fetcher.fetch(request).await?;
    if !response.is_success() {
      return Err(eyre!(
        "{} returned status {}",
        request.url,
        response.status
      ));
    }
    Ok(response)
  }

  /// Purge caches of other versions, then take control of open pages.
  pub(crate) async fn activate(&self) -> Result<ActivateReport> {
    let registration = Registration::load(&*self.storage)?;
    let installed = registration.waiting.as_deref() == Some(self.version.as_str())
      || registration.active.as_deref() == Some(self.version.as_str());
    if !installed {
      return Err(eyre!(
        "Cannot activate {}: it has not been installed",
        self.version
      ));
    }

    let mut deleted = Vec::new();
    let mut kept = Vec::new();
    for name in self.storage.cache_names()? {
      if self.names.contains(&name) {
        kept.push(name);
      } else {
        self.storage.delete_cache(&name)?;
        info!(cache = %name, "deleted old cache");
        deleted.push(name);
      }
    }

    Registration::promote(&*self.storage, &self.version)?;
    info!(version = %self.version, "activated, claiming clients");

    Ok(ActivateReport {
      version: self.version.clone(),
      deleted,
      kept,
      claimed: true,
    })
  }
}
