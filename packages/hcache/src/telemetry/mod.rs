//! Cache event observation
//!
//! Engines report outcomes to an observer injected at construction in
//! addition to emitting `tracing` events.

pub mod observer;

pub use observer::{CacheEvent, CacheObserver, NoopObserver};
