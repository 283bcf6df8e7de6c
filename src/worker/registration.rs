//! Which worker version is installed and which one is serving.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::cache::StateStore;

const REGISTRATION_KEY: &str = "workerRegistration";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
  /// Version currently answering requests
  pub active: Option<String>,
  /// Installed version waiting to activate
  pub waiting: Option<String>,
  pub activated_at: Option<DateTime<Utc>>,
}

impl Registration {
  pub fn load<S: StateStore>(store: &S) -> Result<Self> {
    match store.get_state(REGISTRATION_KEY)? {
      Some(raw) => {
        serde_json::from_str(&raw).map_err(|e| eyre!("Corrupt worker registration: {}", e))
      }
      None => Ok(Self::default()),
    }
  }

  /// Record a successful install.
  pub fn record_installed<S: StateStore>(store: &S, version: &str) -> Result<Self> {
    Self::update(store, |registration| {
      registration.waiting = Some(version.to_string());
      Ok(())
    })
  }

  /// Make `version` the active one. It must have been installed.
  pub fn promote<S: StateStore>(store: &S, version: &str) -> Result<Self> {
    Self::update(store, |registration| {
      let installed = registration.waiting.as_deref() == Some(version)
        || registration.active.as_deref() == Some(version);
      if !installed {
        return Err(eyre!("Version {} has not been installed", version));
      }

      registration.active = Some(version.to_string());
      if registration.waiting.as_deref() == Some(version) {
        registration.waiting = None;
      }
      registration.activated_at = Some(Utc::now());
      Ok(())
    })
  }

  fn update<S, G>(store: &S, change: G) -> Result<Self>
  where
    S: StateStore,
    G: FnOnce(&mut Self) -> Result<()>,
  {
    let mut updated = None;
    store.update_state(REGISTRATION_KEY, |current| {
      let mut registration: Self = match current {
        Some(raw) => {
          serde_json::from_str(&raw).map_err(|e| eyre!("Corrupt worker registration: {}", e))?
        }
        None => Self::default(),
      };
      change(&mut registration)?;
      let encoded = serde_json::to_string(&registration)
        .map_err(|e| eyre!("Failed to serialize registration: {}", e))?;
      updated = Some(registration);
      Ok(Some(encoded))
    })?;

    updated.ok_or_else(|| eyre!("Registration update did not run"))
  }
}
