//! Disk-backed HTTP response cache
//!
//! Entries live as file pairs in a single directory:
//! - content blob and JSON metadata sidecar, named after the SHA-256
//!   fingerprint of the resource identifier
//! - freshness deadline kept in the content file's last-write time
//! - last-access time used for least-recently-used eviction
//! - publication and removal through atomic renames only

pub mod cache_config;
pub mod cache_stats;
pub mod engine;
pub mod entry_pair;
pub mod fetch_result;
pub mod fingerprint;
pub mod http_date;
pub mod metadata;
pub mod timestamp;
pub mod validator;

pub use cache_config::CacheConfig;
pub use cache_stats::{CacheStats, CacheStatsSnapshot};
pub use engine::{
    BlockingCache, CacheEngine, CacheEngineBuilder, FetchOptions, Fetched, ItemMetadata,
};
pub use entry_pair::EntryPair;
pub use fetch_result::{
    CACHE_STATUS_HEADER, CacheStatus, FetchResult, STALE_IF_ERROR_HEADER,
    stale_if_error_override,
};
pub use http_date::HttpDateParseError;
pub use metadata::MetadataRecord;
pub use timestamp::{EntryName, EntryTimestamp};
pub use validator::Validator;
