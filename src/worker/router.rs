use reqwest::Method;

use crate::net::Request;

/// Strategy lane a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
  /// Network-first, falling back to the dynamic cache
  Api,
  /// Navigation / HTML documents, cache-first
  Page,
  /// Everything else, cache-first with typed fallbacks
  Static,
}

/// Classify an intercepted request. `None` means the request is not
/// intercepted at all (anything but GET).
pub fn classify(request: &Request, api_prefix: &str) -> Option<Lane> {
  if request.method != Method::GET {
    return None;
  }

  if request.path().starts_with(api_prefix) {
    return Some(Lane::Api);
  }

  let wants_html = request
    .accept()
    .map(|accept| accept.contains("text/html"))
    .unwrap_or(false);

  if wants_html {
    Some(Lane::Page)
  } else {
    Some(Lane::Static)
  }
}
