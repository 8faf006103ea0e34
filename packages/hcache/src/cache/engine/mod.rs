//! Cache engine modules
//!
//! - `core`: CacheEngine struct, builder and background eviction task
//! - `operations`: the fetch state machine and manual insertion
//! - `eviction`: least-recently-used trimming and full purge
//! - `blocking`: synchronous facade with its own runtime

pub mod blocking;
pub mod core;
pub mod eviction;
pub mod operations;

pub use blocking::BlockingCache;
pub use self::core::{CacheEngine, CacheEngineBuilder};
pub use operations::{FetchOptions, Fetched, ItemMetadata, RequestMutator};
