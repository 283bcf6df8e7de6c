//! Pending-reflection queue shared with the application.
//!
//! Items are opaque JSON documents, posted verbatim during background sync.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::cache::StateStore;

/// State key the application writes queued submissions under.
pub const PENDING_KEY: &str = "pendingReflections";

pub struct PendingQueue<'a, S: StateStore> {
  store: &'a S,
}

impl<'a, S: StateStore> PendingQueue<'a, S> {
  pub fn new(store: &'a S) -> Self {
    Self { store }
  }

  /// Every queued item, oldest first.
  pub fn list(&self) -> Result<Vec<Value>> {
    parse_items(self.store.get_state(PENDING_KEY)?)
  }

  /// Append an item; returns the new queue length.
  pub fn enqueue(&self, item: Value) -> Result<usize> {
    let mut len = 0;
    self.store.update_state(PENDING_KEY, |current| {
      let mut items = parse_items(current)?;
      items.push(item);
      len = items.len();
      encode_items(&items)
    })?;
    Ok(len)
  }

  /// Remove every queued item, including any added while a sync pass was
  /// running.
  pub fn clear(&self) -> Result<()> {
    self.store.remove_state(PENDING_KEY)
  }

  /// Finish a sync pass over the first `processed` items: they are replaced
  /// by `retained`, and anything queued after the pass started is kept
  /// behind them. Only appends may happen during the pass, so the caller
  /// must not run two passes at once.
  pub fn complete_pass(&self, processed: usize, retained: Vec<Value>) -> Result<()> {
    self.store.update_state(PENDING_KEY, |current| {
      let mut items = retained;
      items.extend(parse_items(current)?.into_iter().skip(processed));
      encode_items(&items)
    })
  }
}

fn parse_items(raw: Option<String>) -> Result<Vec<Value>> {
  match raw {
    None => Ok(Vec::new()),
    Some(raw) => serde_json::from_str(&raw)
      .map_err(|e| eyre!("Corrupt {} queue: {}", PENDING_KEY, e)),
  }
}

/// Empty queues are removed rather than stored as "[]".
fn encode_items(items: &[Value]) -> Result<Option<String>> {
  if items.is_empty() {
    return Ok(None);
  }
  serde_json::to_string(items)
    .map(Some)
    .map_err(|e| eyre!("Failed to serialize {} queue: {}", PENDING_KEY, e))
}
