//! HTTP plumbing: request/response values and the fetch primitive.

mod client;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use types::{Request, Response};
