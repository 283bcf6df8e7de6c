//! Push messages and notification clicks.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Worker;
use crate::cache::{CacheStorage, StateStore};
use crate::config::NotificationConfig;
use crate::event::EventOutcome;
use crate::net::Fetcher;

pub const OPEN_JOURNAL: &str = "open-journal";
pub const OPEN_ABOUT: &str = "open-about";

/// Body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub url: Option<String>,
}

impl PushPayload {
  /// Missing payload → defaults; text that isn't JSON becomes the body.
  pub fn parse(raw: Option<&str>) -> Self {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
      return Self::default();
    };

    match serde_json::from_str(raw) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(error = %e, "push payload is not JSON, using it as the body");
        Self {
          body: Some(raw.to_string()),
          ..Self::default()
        }
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Default click target
  pub url: String,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  pub fn from_payload(payload: PushPayload, defaults: &NotificationConfig) -> Self {
    Self {
      title: payload.title.unwrap_or_else(|| defaults.title.clone()),
      body: payload.body.unwrap_or_else(|| defaults.body.clone()),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      url: payload.url.unwrap_or_else(|| "/".to_string()),
      actions: vec![
        NotificationAction {
          action: OPEN_JOURNAL.to_string(),
          title: "Open Journal".to_string(),
        },
        NotificationAction {
          action: OPEN_ABOUT.to_string(),
          title: "View Profile".to_string(),
        },
      ],
    }
  }
}

/// Page opened for a click on `action` (`None` for the notification body).
pub fn click_destination(action: Option<&str>, url: Option<&str>) -> String {
  match action {
    Some(OPEN_JOURNAL) => "/journal".to_string(),
    Some(OPEN_ABOUT) => "/about".to_string(),
    _ => url
      .filter(|u| !u.is_empty())
      .unwrap_or("/")
      .to_string(),
  }
}

impl<S, F> Worker<S, F>
where
  S: CacheStorage + StateStore,
  F: Fetcher,
{
  pub(crate) fn push(&self, raw: Option<&str>) -> Notification {
    let notification =
      Notification::from_payload(PushPayload::parse(raw), &self.config.notifications);
    info!(title = %notification.title, url = %notification.url, "showing notification");
    notification
  }

  pub(crate) fn notification_click(
    &self,
    action: Option<&str>,
    url: Option<&str>,
  ) -> Result<EventOutcome> {
    let destination = click_destination(action, url);
    let url = self.config.resolve(&destination)?;
    info!(action = action.unwrap_or("default"), url = %url, "notification clicked");

    Ok(EventOutcome::OpenWindow {
      url,
      dismissed: true,
    })
  }
}
