use std::path::Path;

use crate::cache::fetch_result::CacheStatus;
use crate::error::Error;

/// Something the engine did that a host may want to log or count
#[derive(Debug)]
pub enum CacheEvent<'a> {
    /// A fetch finished with `status`; `path` is set when a stored entry answered it
    Fetched {
        resource: &'a str,
        status: CacheStatus,
        path: Option<&'a Path>,
    },
    /// A fetch failed and the error was returned to the caller
    FetchFailed { resource: &'a str, error: &'a Error },
    /// A stale entry was served in place of `error`
    StaleServed { resource: &'a str, error: &'a Error },
    /// An entry was committed under `path`; `reused` when an identical entry already existed
    Committed { path: &'a Path, reused: bool },
    /// An entry was removed by eviction or purge
    Evicted { path: &'a Path },
    /// An entry could not be removed and was left in place
    PurgeSkipped { path: &'a Path, error: &'a Error },
}

/// Receives [`CacheEvent`]s from an engine
pub trait CacheObserver: Send + Sync + 'static {
    fn on_event(&self, event: &CacheEvent<'_>);
}

impl<F> CacheObserver for F
where
    F: Fn(&CacheEvent<'_>) + Send + Sync + 'static,
{
    fn on_event(&self, event: &CacheEvent<'_>) {
        self(event);
    }
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {
    fn on_event(&self, _event: &CacheEvent<'_>) {}
}
