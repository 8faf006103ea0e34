//! Directory eviction
//!
//! Least-recently-used trimming down to `max_entries`, full purge and removal
//! of temporary files left behind by interrupted commits. All of it is
//! blocking filesystem work; the async wrappers move it off the runtime.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use super::super::entry_pair;
use super::super::timestamp::TEMP_EXTENSION;
use super::core::{CacheEngine, EngineInner};
use crate::error::{self, Result};
use crate::telemetry::CacheEvent;

/// Temporary files older than this belong to a crashed writer
const ORPHAN_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// Clears the eviction flag when a pass ends, including by panic
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EngineInner {
    /// Trim the directory to the `max_entries` most recently read entries.
    ///
    /// Returns the number of entries removed. A pass already in progress makes
    /// this a no-op.
    pub(super) fn purge_old(&self) -> Result<usize> {
        if self
            .purge_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                target: "hcache::cache::eviction",
                "Eviction pass already running, skipping"
            );
            return Ok(0);
        }
        let _guard = PassGuard(&self.purge_running);

        let mut entries = Vec::new();
        for path in entry_pair::list_entries(&self.config.directory)? {
            match fs::metadata(&path).and_then(|meta| meta.accessed()) {
                Ok(accessed) => entries.push((accessed, path)),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        // Most recently used first
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        let mut evicted = 0;
        for (_, path) in entries.iter().skip(self.config.max_entries) {
            if self.purge_contained(path)? {
                evicted += 1;
            }
        }

        self.sweep_orphaned_temps();

        if evicted > 0 {
            tracing::info!(
                target: "hcache::cache::eviction",
                evicted,
                kept = entries.len() - evicted,
                "Evicted least recently used entries"
            );
        }
        Ok(evicted)
    }

    /// Remove every entry in the directory.
    pub(super) fn purge_all(&self) -> Result<usize> {
        let mut purged = 0;
        for path in entry_pair::list_entries(&self.config.directory)? {
            if self.purge_contained(&path)? {
                purged += 1;
            }
        }

        tracing::info!(
            target: "hcache::cache::eviction",
            purged,
            directory = %self.config.directory.display(),
            "Purged cache directory"
        );
        Ok(purged)
    }

    /// Remove one entry, counting and reporting it.
    pub(super) fn purge_entry(&self, path: &Path) -> Result<()> {
        entry_pair::purge_one(path)?;
        self.stats.record_eviction();
        self.emit(&CacheEvent::Evicted { path });
        Ok(())
    }

    /// Like [`Self::purge_entry`] but only fatal errors escape; others leave the entry in place.
    fn purge_contained(&self, path: &Path) -> Result<bool> {
        match self.purge_entry(path) {
            Ok(()) => Ok(true),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::warn!(
                    target: "hcache::cache::eviction",
                    path = %path.display(),
                    error = %err,
                    "Entry could not be purged, leaving it in place"
                );
                self.emit(&CacheEvent::PurgeSkipped { path, error: &err });
                Ok(false)
            }
        }
    }

    fn sweep_orphaned_temps(&self) {
        let Ok(read_dir) = fs::read_dir(&self.config.directory) else {
            return;
        };
        let now = SystemTime::now();

        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMP_EXTENSION) {
                continue;
            }
            let Ok(meta) = dir_entry.metadata() else {
                continue;
            };
            // Staged content carries its future expiry as mtime; the access time is the write time
            let touched = match (meta.modified(), meta.accessed()) {
                (Ok(modified), Ok(accessed)) => modified.max(accessed),
                (Ok(time), Err(_)) | (Err(_), Ok(time)) => time,
                (Err(_), Err(_)) => continue,
            };
            let orphaned = now
                .duration_since(touched)
                .is_ok_and(|age| age > ORPHAN_TEMP_AGE);
            if orphaned && let Err(err) = fs::remove_file(&path) {
                tracing::debug!(
                    target: "hcache::cache::eviction",
                    path = %path.display(),
                    error = %err,
                    "Failed to remove orphaned temporary file"
                );
            }
        }
    }
}

impl CacheEngine {
    /// Trim the directory to the configured number of entries.
    pub async fn purge_old(&self) -> Result<usize> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.purge_old())
            .await
            .map_err(error::invalid_state)?
    }

    /// Remove every entry.
    pub async fn purge(&self) -> Result<usize> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.purge_all())
            .await
            .map_err(error::invalid_state)?
    }
}

#[cfg(test)]
mod tests {
    use std::fs::FileTimes;
    use std::time::UNIX_EPOCH;

    use super::*;

    #[test]
    fn test_pass_guard_releases_flag() {
        let flag = AtomicBool::new(true);
        {
            let _guard = PassGuard(&flag);
        }
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_orphaned_temps_are_swept() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let config = crate::cache::cache_config::CacheConfig {
            auto_purge: false,
            ..crate::cache::cache_config::CacheConfig::new(dir.path())
        };
        let engine = CacheEngine::new(config, crate::http::hyper_transport::HyperTransport::plain())
            .unwrap_or_else(|e| panic!("engine: {e}"));

        let old = dir.path().join("abandoned.0000000000000001.tmp");
        let young = dir.path().join("staging.0000000000000002.tmp");
        fs::write(&old, b"x").unwrap_or_else(|e| panic!("write: {e}"));
        fs::write(&young, b"x").unwrap_or_else(|e| panic!("write: {e}"));
        let long_ago = UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs::File::options()
            .write(true)
            .open(&old)
            .and_then(|file| file.set_times(FileTimes::new().set_accessed(long_ago).set_modified(long_ago)))
            .unwrap_or_else(|e| panic!("set_times: {e}"));

        let evicted = engine.purge_old().await.unwrap_or_else(|e| panic!("purge_old: {e}"));
        assert_eq!(evicted, 0);
        assert!(!old.exists());
        assert!(young.exists());
    }
}
