//! # hcache
//!
//! Disk-backed HTTP response cache for resources fetched by identifier.
//! Responses are persisted as a content blob plus a JSON metadata sidecar in a
//! single directory, and reused across processes and restarts.
//!
//! ## Features
//!
//! - **Freshness from `Expires` / `Cache-Control: max-age`**, answered with no network call
//! - **Conditional revalidation** with `If-None-Match` and `If-Modified-Since`
//! - **Stale-if-error** fallback when the origin is unreachable or failing
//! - **Atomic commits and purges** through exclusive links and renames, safe across concurrent writers
//! - **HTTPS** through rustls in the default transport (`rustls` feature, on by default)
//! - **Least-recently-used eviction** on a background tokio task
//! - **Blocking facade** for callers that cannot suspend
//!
//! ## Usage
//!
//! ```no_run
//! use hcache::prelude::*;
//!
//! # async fn run() -> hcache::Result<()> {
//! let engine = CacheEngine::builder(CacheConfig::new("/var/cache/myapp")).build()?;
//! let fetched = engine
//!     .fetch_string("http://example.com/data.json", FetchOptions::new())
//!     .await?;
//! println!("{:?}: {} bytes", fetched.status, fetched.value.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod http;
pub mod prelude;
pub mod telemetry;

pub use cache::{
    BlockingCache, CacheConfig, CacheEngine, CacheEngineBuilder, CacheStatus, FetchOptions,
    FetchResult, Fetched, ItemMetadata,
};
pub use error::{Error, Kind, Result};
pub use crate::http::{HttpTransport, HyperTransport};
