//! Persistent cache stores backing the offline layer.
//!
//! This module provides:
//! - Named request → response caches, versioned per worker release
//! - Atomic batch inserts for all-or-nothing pre-caching
//! - A small key → JSON state store for data shared with the application

mod names;
mod storage;
mod traits;

pub use names::CacheNames;
pub use storage::SqliteStorage;
pub use traits::{CacheSource, CacheStorage, CachedResponse, Served, StateStore};
