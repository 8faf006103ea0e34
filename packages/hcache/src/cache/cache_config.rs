//! Cache configuration and preset policies
//!
//! Provides `CacheConfig` for configuring the cache directory, the eviction
//! ceiling, the background purge interval and the default stale-if-error policy.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{self, Result};

/// Lowest accepted `max_entries`
pub const MIN_MAX_ENTRIES: usize = 100;

/// Cache configuration and limits
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding entry files
    pub directory: PathBuf,
    /// Number of most recently used entries kept by eviction
    pub max_entries: usize,
    /// Run eviction in the background
    pub auto_purge: bool,
    /// Pause between background eviction passes
    pub purge_interval: Duration,
    /// Serve stale entries on origin failure unless a fetch overrides it
    pub stale_if_error: bool,
    /// Upper bound on a single origin round trip
    pub request_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("hcache"),
            max_entries: 1000,
            auto_purge: true,
            purge_interval: Duration::from_secs(10 * 60),
            stale_if_error: false,
            request_timeout: Some(Duration::from_secs(100)),
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `directory`
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Keep stale entries usable through origin outages
    #[must_use]
    pub fn resilient(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_entries: 5000,
            stale_if_error: true,
            ..Self::default()
        }
    }

    /// Smallest footprint the cache accepts, purged often
    #[must_use]
    pub fn conservative(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_entries: MIN_MAX_ENTRIES,
            purge_interval: Duration::from_secs(2 * 60),
            ..Self::default()
        }
    }

    /// Reject limits the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(error::configuration("cache directory must not be empty"));
        }
        if self.directory.exists() && !self.directory.is_dir() {
            return Err(error::configuration(format!(
                "cache directory {} is not a directory",
                self.directory.display()
            )));
        }
        if self.max_entries < MIN_MAX_ENTRIES {
            return Err(error::configuration(format!(
                "max_entries must be at least {MIN_MAX_ENTRIES}, got {}",
                self.max_entries
            )));
        }
        if self.auto_purge && self.purge_interval.is_zero() {
            return Err(error::configuration(
                "purge_interval must be greater than zero when auto_purge is enabled",
            ));
        }
        if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(error::configuration("request_timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        assert!(CacheConfig::new("/tmp/hcache-config").validate().is_ok());
        assert!(CacheConfig::resilient("/tmp/hcache-config").validate().is_ok());
        assert!(CacheConfig::conservative("/tmp/hcache-config").validate().is_ok());
    }

    #[test]
    fn test_rejects_small_max_entries() {
        let config = CacheConfig {
            max_entries: MIN_MAX_ENTRIES - 1,
            ..CacheConfig::new("/tmp/hcache-config")
        };
        let err = config.validate().err().unwrap_or_else(|| panic!("should fail"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_file_as_directory() {
        let file = tempfile::NamedTempFile::new().unwrap_or_else(|e| panic!("tempfile: {e}"));
        let err = CacheConfig::new(file.path())
            .validate()
            .err()
            .unwrap_or_else(|| panic!("should fail"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = CacheConfig {
            purge_interval: Duration::ZERO,
            ..CacheConfig::new("/tmp/hcache-config")
        };
        assert!(config.validate().is_err());
    }
}
