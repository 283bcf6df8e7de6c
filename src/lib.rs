//! Offline caching layer for the learning journal.
//!
//! Requests from the journal's pages are classified into API, page and
//! static-asset lanes and answered from a versioned local cache or the
//! network, with soft fallbacks when both are unavailable. Reflections
//! written offline are replayed against the API by background sync.

pub mod cache;
pub mod config;
pub mod event;
pub mod logging;
pub mod net;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use event::{EventKind, EventOutcome, WorkerEvent};
pub use worker::Worker;
