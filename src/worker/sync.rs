//! Background sync of reflections queued while offline.

use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use super::queue::PendingQueue;
use super::Worker;
use crate::cache::{CacheStorage, StateStore};
use crate::config::SyncPolicy;
use crate::net::{Fetcher, Request};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub attempted: usize,
  pub delivered: usize,
  pub failed: usize,
  /// Failed entries left in the queue for the next sync
  pub retained: usize,
  /// Failed entries discarded
  pub dropped: usize,
}

impl<S, F> Worker<S, F>
where
  S: CacheStorage + StateStore,
  F: Fetcher,
{
  /// POST every queued reflection in order, then settle the queue
  /// according to the configured policy. Passes on one worker run one at a
  /// time; a pass triggered during another starts once it has finished.
  pub(crate) async fn sync_reflections(&self) -> Result<SyncReport> {
    let _pass = self.sync_lock.lock().await;
    let queue = PendingQueue::new(&*self.storage);
    let entries = queue.list()?;
    if entries.is_empty() {
      return Ok(SyncReport::default());
    }

    let endpoint = self.config.resolve(&self.config.reflections_endpoint)?;
    let mut failed = Vec::new();
    let mut delivered = 0;

    for (index, entry) in entries.iter().enumerate() {
      let body = serde_json::to_vec(entry)
        .map_err(|e| eyre!("Failed to encode queued reflection {}: {}", index, e))?;

      match self
        .fetcher
        .fetch(&Request::post_json(endpoint.clone(), body))
        .await
      {
        Ok(response) if response.is_success() => {
          delivered += 1;
          info!(index, "synced reflection");
        }
        Ok(response) => {
          warn!(index, status = response.status, "reflection rejected by server");
          failed.push(entry.clone());
        }
        Err(e) => {
          warn!(index, error = %e, "failed to sync reflection");
          failed.push(entry.clone());
        }
      }
    }

    let failed_count = failed.len();
    let (retained, dropped) = match self.config.sync_policy {
      SyncPolicy::RetainFailed => {
        queue.complete_pass(entries.len(), failed)?;
        (failed_count, 0)
      }
      SyncPolicy::DropFailed => {
        // Also drops anything queued while the pass was running
        queue.clear()?;
        (0, failed_count)
      }
    };

    info!(
      attempted = entries.len(),
      delivered, retained, dropped, "sync pass finished"
    );

    Ok(SyncReport {
      attempted: entries.len(),
      delivered,
      failed: failed_count,
      retained,
      dropped,
    })
  }
}
