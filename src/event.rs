use serde::Deserialize;
use url::Url;

use crate::cache::Served;
use crate::net::Request;
use crate::worker::{ActivateReport, InstallReport, Notification, RefreshReport, SyncReport};

/// Platform-delivered events the worker listens for
#[derive(Debug)]
pub enum WorkerEvent {
  /// A new version is being installed
  Install,
  /// An installed version takes over
  Activate,
  /// A page issued a request
  Fetch(Request),
  /// One-off background sync, fired when connectivity returns
  Sync { tag: String },
  /// Periodic background sync
  PeriodicSync { tag: String },
  /// Push message, payload is the raw message text
  Push { payload: Option<String> },
  /// The user clicked a notification or one of its actions
  NotificationClick {
    action: Option<String>,
    url: Option<String>,
  },
}

/// Discriminant of a `WorkerEvent`. Also the key of the listener table in
/// `Config::listeners`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
  Sync,
  PeriodicSync,
  Push,
  NotificationClick,
}

impl EventKind {
  pub const ALL: [EventKind; 7] = [
    Self::Install,
    Self::Activate,
    Self::Fetch,
    Self::Sync,
    Self::PeriodicSync,
    Self::Push,
    Self::NotificationClick,
  ];
}

impl WorkerEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      Self::Install => EventKind::Install,
      Self::Activate => EventKind::Activate,
      Self::Fetch(_) => EventKind::Fetch,
      Self::Sync { .. } => EventKind::Sync,
      Self::PeriodicSync { .. } => EventKind::PeriodicSync,
      Self::Push { .. } => EventKind::Push,
      Self::NotificationClick { .. } => EventKind::NotificationClick,
    }
  }
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  /// The worker answered the request
  Responded(Served),
  /// The request is not intercepted and goes to the network untouched
  Passthrough(Request),
  Synced(SyncReport),
  Refreshed(RefreshReport),
  Notified(Notification),
  /// Open (or focus) a page; the notification is closed first
  OpenWindow { url: Url, dismissed: bool },
  /// No listener is registered for the event, or it carried a tag this
  /// worker does not handle
  Ignored { reason: String },
}
