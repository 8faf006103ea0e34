//! hcache Prelude
//!
//! The types needed to configure an engine, fetch through it and read results.

// Engine and configuration
pub use crate::cache::{BlockingCache, CacheConfig, CacheEngine, CacheEngineBuilder};

// Fetching
pub use crate::cache::{
    CacheStatus, FetchOptions, FetchResult, Fetched, ItemMetadata, MetadataRecord,
};

// Error types
pub use crate::error::{Error, Kind, Result};

// Transport seam
pub use crate::http::{HttpTransport, HyperTransport, Trailers};

// Observation
pub use crate::telemetry::{CacheEvent, CacheObserver};
pub use crate::cache::{CacheStats, CacheStatsSnapshot};

// Cancellation
pub use tokio_util::sync::CancellationToken;
