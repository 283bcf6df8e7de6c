//! Request and response values exchanged between pages, the worker and the network.

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use url::Url;

/// An intercepted request.
///
/// Header names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Bytes>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: BTreeMap::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// A POST carrying a JSON document.
  pub fn post_json(url: Url, body: impl Into<Bytes>) -> Self {
    let mut request = Self::new(Method::POST, url).with_header("content-type", "application/json");
    request.body = Some(body.into());
    request
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn accept(&self) -> Option<&str> {
    self.header("accept")
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Identity of the request inside a cache: method plus absolute URL.
  pub fn cache_key(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A response, either live from the network, read back from a cache, or
/// synthesized as an offline fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Bytes,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers: BTreeMap::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self
      .headers
      .insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  /// 200 response with an HTML document.
  pub fn html(body: impl Into<Bytes>) -> Self {
    Self::new(200, body).with_header("content-type", "text/html; charset=utf-8")
  }

  /// Response with a JSON document; serialization of plain data cannot fail
  /// in practice, an error still degrades to an empty object.
  pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Self::new(status, body).with_header("content-type", "application/json")
  }

  pub fn text(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
    Self::new(status, body).with_header("content-type", content_type)
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }

  pub fn body_text(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let request = Request::get(url("http://localhost/journal")).with_header("Accept", "text/html");
    assert_eq!(request.accept(), Some("text/html"));
    assert_eq!(request.header("ACCEPT"), Some("text/html"));
  }

  #[test]
  fn test_cache_key_includes_method_and_url() {
    let request = Request::get(url("http://localhost/api/reflections?x=1"));
    assert_eq!(request.cache_key(), "GET http://localhost/api/reflections?x=1");
  }

  #[test]
  fn test_post_json_sets_content_type() {
    let request = Request::post_json(url("http://localhost/api/reflections"), "{}");
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
  }

  #[test]
  fn test_success_range() {
    assert!(Response::new(200, "").is_success());
    assert!(Response::new(204, "").is_success());
    assert!(!Response::new(304, "").is_success());
    assert!(!Response::new(500, "").is_success());
  }
}
