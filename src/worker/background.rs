//! Fire-and-forget work that outlives the handler that started it.

use color_eyre::Result;
use std::future::Future;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Tracker for detached, non-blocking tasks.
///
/// The spawning handler never waits for these tasks and never sees their
/// errors; failures go to the log. `settle` is the pending-work token: it
/// resolves once every task spawned so far has finished.
#[derive(Clone)]
pub struct Background {
  tracker: TaskTracker,
}

impl Background {
  pub fn new() -> Self {
    Self {
      tracker: TaskTracker::new(),
    }
  }

  /// Start `work` without waiting for it.
  pub fn spawn<Fut>(&self, label: &'static str, url: String, work: Fut)
  where
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.tracker.spawn(async move {
      match work.await {
        Ok(()) => debug!(task = label, url = %url, "background task finished"),
        Err(e) => warn!(task = label, url = %url, error = %e, "background task failed"),
      }
    });
  }

  /// Number of tasks still running.
  pub fn pending(&self) -> usize {
    self.tracker.len()
  }

  /// Wait until every spawned task has finished.
  pub async fn settle(&self) {
    self.tracker.close();
    self.tracker.wait().await;
    self.tracker.reopen();
  }
}

impl Default for Background {
  fn default() -> Self {
    Self::new()
  }
}
