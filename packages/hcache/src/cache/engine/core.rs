//! Core CacheEngine structure and initialization
//!
//! The engine owns the transport, the injected observer and the background
//! eviction task. All cache state lives in the directory; the only in-process
//! mutable state is the eviction guard and the counters.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use super::super::{cache_config::CacheConfig, cache_stats::CacheStats};
use crate::error::{self, Result};
use crate::http::hyper_transport::HyperTransport;
use crate::http::transport::HttpTransport;
use crate::telemetry::{CacheEvent, CacheObserver, NoopObserver};

/// Disk-backed HTTP response cache
pub struct CacheEngine {
    pub(super) inner: Arc<EngineInner>,
    purge_task: Option<JoinHandle<()>>,
}

pub(super) struct EngineInner {
    pub(super) config: CacheConfig,
    pub(super) transport: Arc<dyn HttpTransport>,
    pub(super) observer: Arc<dyn CacheObserver>,
    pub(super) stats: CacheStats,
    /// Set while an eviction pass runs
    pub(super) purge_running: AtomicBool,
}

impl EngineInner {
    pub(super) fn emit(&self, event: &CacheEvent<'_>) {
        self.observer.on_event(event);
    }
}

/// Builder for [`CacheEngine`]
pub struct CacheEngineBuilder {
    config: CacheConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    observer: Option<Arc<dyn CacheObserver>>,
}

impl CacheEngineBuilder {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            transport: None,
            observer: None,
        }
    }

    #[must_use]
    pub fn transport(mut self, transport: impl HttpTransport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn observer(mut self, observer: impl CacheObserver) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Validate the configuration, create the directory and start eviction.
    ///
    /// Background eviction needs a tokio runtime; without one the engine still
    /// works and `purge_old` has to be called by the host.
    pub fn build(self) -> Result<CacheEngine> {
        self.config.validate()?;
        std::fs::create_dir_all(&self.config.directory).map_err(|err| {
            error::configuration(format!(
                "cannot create cache directory {}: {err}",
                self.config.directory.display()
            ))
        })?;

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };

        let inner = Arc::new(EngineInner {
            transport,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            stats: CacheStats::default(),
            purge_running: AtomicBool::new(false),
            config: self.config,
        });

        let purge_task = if inner.config.auto_purge {
            spawn_purge_task(&inner)
        } else {
            None
        };

        tracing::debug!(
            target: "hcache::cache::engine",
            directory = %inner.config.directory.display(),
            max_entries = inner.config.max_entries,
            auto_purge = purge_task.is_some(),
            "Cache engine started"
        );

        Ok(CacheEngine { inner, purge_task })
    }
}

impl CacheEngine {
    #[must_use]
    pub fn builder(config: CacheConfig) -> CacheEngineBuilder {
        CacheEngineBuilder::new(config)
    }

    /// Engine over `transport` with default observer
    pub fn new(config: CacheConfig, transport: impl HttpTransport) -> Result<Self> {
        Self::builder(config).transport(transport).build()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn directory(&self) -> &Path {
        &self.inner.config.directory
    }

    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }
}

impl Drop for CacheEngine {
    fn drop(&mut self) {
        if let Some(task) = self.purge_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.inner.config)
            .field("stats", &self.inner.stats.snapshot())
            .finish_non_exhaustive()
    }
}

/// Periodic eviction: sleep, run one pass to completion, sleep again.
///
/// The task holds a weak reference so it never keeps a dropped engine alive.
fn spawn_purge_task(inner: &Arc<EngineInner>) -> Option<JoinHandle<()>> {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(
            target: "hcache::cache::engine",
            "No tokio runtime available - background eviction disabled"
        );
        return None;
    };

    let interval = inner.config.purge_interval;
    let weak: Weak<EngineInner> = Arc::downgrade(inner);

    Some(handle.spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let Some(inner) = weak.upgrade() else {
                break;
            };
            let pass = tokio::task::spawn_blocking(move || inner.purge_old()).await;
            match pass {
                Ok(Ok(evicted)) => tracing::debug!(
                    target: "hcache::cache::engine",
                    evicted,
                    "Background eviction pass finished"
                ),
                Ok(Err(err)) => tracing::error!(
                    target: "hcache::cache::engine",
                    error = %err,
                    "Background eviction pass failed"
                ),
                Err(join_err) => tracing::error!(
                    target: "hcache::cache::engine",
                    error = %join_err,
                    "Background eviction pass panicked"
                ),
            }
        }
    }))
}
