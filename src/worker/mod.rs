//! The offline worker: lifecycle, request strategies and background handlers.
//!
//! A `Worker` owns explicit handles to its stores and the network, bound to
//! one cache version. Events are dispatched through `Worker::handle`: kinds
//! missing from the configured listener table are ignored, and every other
//! `WorkerEvent` variant maps to exactly one handler.

mod background;
mod lifecycle;
pub mod offline;
mod push;
mod queue;
mod refresh;
mod registration;
mod router;
mod strategy;
mod sync;

pub use background::Background;
pub use lifecycle::{ActivateReport, InstallReport};
pub use push::{click_destination, Notification, NotificationAction, PushPayload};
pub use queue::{PendingQueue, PENDING_KEY};
pub use refresh::RefreshReport;
pub use registration::Registration;
pub use router::{classify, Lane};
pub use strategy::{AssetKind, API_OFFLINE_MESSAGE};
pub use sync::SyncReport;

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::{CacheNames, CacheStorage, StateStore};
use crate::config::Config;
use crate::event::{EventKind, EventOutcome, WorkerEvent};
use crate::net::{Fetcher, Request};

pub struct Worker<S, F> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  config: Arc<Config>,
  version: String,
  names: CacheNames,
  background: Background,
  /// Held for a whole sync pass; passes over the queue never overlap
  sync_lock: Arc<Mutex<()>>,
}

impl<S, F> Clone for Worker<S, F> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      config: Arc::clone(&self.config),
      version: self.version.clone(),
      names: self.names.clone(),
      background: self.background.clone(),
      sync_lock: Arc::clone(&self.sync_lock),
    }
  }
}

impl<S, F> Worker<S, F> {
  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Whether the listener table has an entry for `kind`.
  pub fn listens_to(&self, kind: EventKind) -> bool {
    self.config.listeners.contains(&kind)
  }
}

impl<S, F> Worker<S, F>
where
  S: CacheStorage + StateStore,
  F: Fetcher,
{
  /// Worker bound to an explicit cache version.
  pub fn new(storage: Arc<S>, fetcher: Arc<F>, config: Arc<Config>, version: &str) -> Self {
    let names = CacheNames::for_version(&config.cache_prefix, version);
    Self {
      storage,
      fetcher,
      config,
      version: version.to_string(),
      names,
      background: Background::new(),
      sync_lock: Arc::new(Mutex::new(())),
    }
  }

  /// Worker for the version named in the configuration.
  pub fn current(storage: Arc<S>, fetcher: Arc<F>, config: Arc<Config>) -> Self {
    let version = config.version.clone();
    Self::new(storage, fetcher, config, &version)
  }

  /// Dispatch one event to its handler.
  pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome> {
    let kind = event.kind();
    debug!(?kind, version = %self.version, "handling event");

    if !self.listens_to(kind) {
      return Ok(unregistered(event));
    }

    match event {
      WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
      WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
      WorkerEvent::Fetch(request) => Ok(self.respond(request).await),
      WorkerEvent::Sync { tag } => {
        if tag != self.config.sync_tag {
          return Ok(ignored_tag("sync", &tag));
        }
        self.sync_reflections().await.map(EventOutcome::Synced)
      }
      WorkerEvent::PeriodicSync { tag } => {
        if tag != self.config.periodic_tag {
          return Ok(ignored_tag("periodic sync", &tag));
        }
        Ok(EventOutcome::Refreshed(self.refresh_content().await))
      }
      WorkerEvent::Push { payload } => Ok(EventOutcome::Notified(self.push(payload.as_deref()))),
      WorkerEvent::NotificationClick { action, url } => {
        self.notification_click(action.as_deref(), url.as_deref())
      }
    }
  }

  /// Route a request to its lane. Non-GET requests are handed back untouched.
  async fn respond(&self, request: Request) -> EventOutcome {
    let Some(lane) = classify(&request, &self.config.api_prefix) else {
      return EventOutcome::Passthrough(request);
    };

    debug!(url = %request.url, lane = ?lane, "intercepted request");
    let served = match lane {
      Lane::Api => self.handle_api(request).await,
      Lane::Page => self.handle_page(request).await,
      Lane::Static => self.handle_static(request).await,
    };
    EventOutcome::Responded(served)
  }

  /// Wait for every fire-and-forget task started so far.
  pub async fn settle(&self) {
    let pending = self.background.pending();
    if pending > 0 {
      info!(pending, "waiting for background work");
    }
    self.background.settle().await;
  }
}

/// Outcome for an event with no listener. Requests still reach the network.
fn unregistered(event: WorkerEvent) -> EventOutcome {
  debug!(kind = ?event.kind(), "no listener registered");
  match event {
    WorkerEvent::Fetch(request) => EventOutcome::Passthrough(request),
    other => EventOutcome::Ignored {
      reason: format!("no listener registered for {:?}", other.kind()),
    },
  }
}

fn ignored_tag(kind: &str, tag: &str) -> EventOutcome {
  debug!(tag, "ignoring unknown {} tag", kind);
  EventOutcome::Ignored {
    reason: format!("unknown {} tag '{}'", kind, tag),
  }
}
