//! SQLite implementation of the cache and state stores.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CacheStorage, CachedResponse, StateStore};
use crate::net::{Request, Response};

/// SQLite-based storage for named caches and local state.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Private in-memory database, used by tests and dry runs.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Number of entries per cache, for inspection.
  pub fn entry_counts(&self) -> Result<Vec<(String, usize)>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT c.name, COUNT(e.request_key) FROM caches c
         LEFT JOIN cache_entries e ON e.cache_name = c.name
         GROUP BY c.name
         ORDER BY c.created_at, c.name",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let counts = stmt
      .query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
      })
      .map_err(|e| eyre!("Failed to count cache entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache counts: {}", e))?;

    Ok(counts)
  }
}

/// Schema for cache and state tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS caches (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- One row per stored request; request_key is the SHA-256 of "METHOD URL"
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (cache_name, request_key)
);

CREATE TABLE IF NOT EXISTS state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Stable, fixed-length key for a request.
fn request_key(request: &Request) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.cache_key().as_bytes());
  hex::encode(hasher.finalize())
}

fn ensure_cache(conn: &Connection, cache: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?, ?)",
      params![cache, Utc::now().to_rfc3339()],
    )
    .map_err(|e| eyre!("Failed to create cache {}: {}", cache, e))?;
  Ok(())
}

fn insert_entry(conn: &Connection, cache: &str, request: &Request, response: &Response) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, request_key, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?)",
      params![
        cache,
        request_key(request),
        request.url.as_str(),
        response.status,
        headers,
        response.body.as_ref(),
        Utc::now().to_rfc3339(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", request.url, cache, e))?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open(&self, cache: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_cache(&conn, cache)
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache names: {}", e))?;

    Ok(names)
  }

  fn delete_cache(&self, cache: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![cache],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", cache, e))?;
    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![cache])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_request(&self, cache: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(String, u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT url, status, headers, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND request_key = ?",
        params![cache, request_key(request)],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", request.url, cache, e))?;

    let Some((url, status, headers, body, cached_at)) = row else {
      return Ok(None);
    };

    let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", url, e))?;

    Ok(Some(CachedResponse {
      url,
      response: Response {
        status,
        headers,
        body: body.into(),
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, cache: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    ensure_cache(&conn, cache)?;
    insert_entry(&conn, cache, request, response)
  }

  fn put_all(&self, cache: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_cache(&tx, cache)?;
    for (request, response) in entries {
      insert_entry(&tx, cache, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }

  fn keys(&self, cache: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT url FROM cache_entries WHERE cache_name = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![cache], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", cache, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read keys of {}: {}", cache, e))?;

    Ok(urls)
  }
}

impl StateStore for SqliteStorage {
  fn get_state(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    read_state(&conn, key)
  }

  fn set_state(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    write_state(&conn, key, Some(value))
  }

  fn remove_state(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    write_state(&conn, key, None)
  }

  fn update_state<G>(&self, key: &str, f: G) -> Result<()>
  where
    G: FnOnce(Option<String>) -> Result<Option<String>>,
  {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let current = read_state(&tx, key)?;
    let next = f(current)?;
    write_state(&tx, key, next.as_deref())?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))
  }
}

fn read_state(conn: &Connection, key: &str) -> Result<Option<String>> {
  conn
    .query_row(
      "SELECT value FROM state WHERE key = ?",
      params![key],
      |row| row.get(0),
    )
    .optional()
    .map_err(|e| eyre!("Failed to read state '{}': {}", key, e))
}

fn write_state(conn: &Connection, key: &str, value: Option<&str>) -> Result<()> {
  let result = match value {
    Some(value) => conn.execute(
      "INSERT OR REPLACE INTO state (key, value) VALUES (?, ?)",
      params![key, value],
    ),
    None => conn.execute("DELETE FROM state WHERE key = ?", params![key]),
  };
  result.map_err(|e| eyre!("Failed to write state '{}': {}", key, e))?;
  Ok(())
}

/// Parse an RFC 3339 timestamp written by this module.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn request(path: &str) -> Request {
    Request::get(Url::parse("http://localhost:5000").unwrap().join(path).unwrap())
  }

  #[test]
  fn test_put_then_match() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let response = Response::html("<h1>journal</h1>").with_header("etag", "abc");

    storage.put("static", &request("/journal"), &response).unwrap();

    let cached = storage
      .match_request("static", &request("/journal"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response, response);
    assert_eq!(cached.url, "http://localhost:5000/journal");
    assert!(storage
      .match_request("dynamic", &request("/journal"))
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_put_overwrites_existing_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("static", &request("/"), &Response::html("old"))
      .unwrap();
    storage
      .put("static", &request("/"), &Response::html("new"))
      .unwrap();

    let cached = storage.match_request("static", &request("/")).unwrap().unwrap();
    assert_eq!(cached.response.body_text(), "new");
    assert_eq!(storage.keys("static").unwrap().len(), 1);
  }

  #[test]
  fn test_delete_cache_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage
      .put("old", &request("/"), &Response::html("x"))
      .unwrap();
    storage.open("keep").unwrap();

    assert!(storage.delete_cache("old").unwrap());
    assert!(!storage.delete_cache("old").unwrap());
    assert_eq!(storage.cache_names().unwrap(), vec!["keep".to_string()]);
    assert!(storage.keys("old").unwrap().is_empty());
  }

  #[test]
  fn test_put_all_stores_batch() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![
      (request("/"), Response::html("home")),
      (request("/about"), Response::html("about")),
    ];
    storage.put_all("static", &entries).unwrap();

    assert_eq!(
      storage.keys("static").unwrap(),
      vec![
        "http://localhost:5000/".to_string(),
        "http://localhost:5000/about".to_string()
      ]
    );
    assert_eq!(
      storage.entry_counts().unwrap(),
      vec![("static".to_string(), 2)]
    );
  }

  #[test]
  fn test_state_round_trip_and_update() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert!(storage.get_state("k").unwrap().is_none());

    storage.set_state("k", "[1]").unwrap();
    storage
      .update_state("k", |current| {
        assert_eq!(current.as_deref(), Some("[1]"));
        Ok(Some("[1,2]".to_string()))
      })
      .unwrap();
    assert_eq!(storage.get_state("k").unwrap().as_deref(), Some("[1,2]"));

    storage.update_state("k", |_| Ok(None)).unwrap();
    assert!(storage.get_state("k").unwrap().is_none());
  }

  #[test]
  fn test_failed_update_leaves_state_untouched() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.set_state("k", "kept").unwrap();

    let result = storage.update_state("k", |_| Err(eyre!("boom")));
    assert!(result.is_err());
    assert_eq!(storage.get_state("k").unwrap().as_deref(), Some("kept"));
  }
}
