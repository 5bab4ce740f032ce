//! Cache configuration.
//!
//! Controls entry lifetimes, capacity and the sweep cadence via `mediawatch.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_MAX_ENTRIES: usize = 1000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_DETAIL_TTL_SECS: u64 = 600;
const DEFAULT_CATEGORY_TTL_SECS: u64 = 3600;
const DEFAULT_DOWNLOAD_TTL_SECS: u64 = 600;

/// Cache configuration from `mediawatch.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching on the read paths.
    pub enabled: bool,
    /// Lifetime of entries stored without an explicit TTL.
    pub default_ttl_secs: u64,
    /// Entry count at which inserts start evicting.
    pub max_entries: usize,
    /// Interval between expired-entry sweeps.
    pub sweep_interval_secs: u64,
    /// Lifetime of single-article lookups.
    pub detail_ttl_secs: u64,
    /// Lifetime of category listings and lookups.
    pub category_ttl_secs: u64,
    /// Lifetime of download listings.
    pub download_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
            category_ttl_secs: DEFAULT_CATEGORY_TTL_SECS,
            download_ttl_secs: DEFAULT_DOWNLOAD_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_secs: settings.default_ttl_secs,
            max_entries: settings.max_entries,
            sweep_interval_secs: settings.sweep_interval_secs,
            detail_ttl_secs: settings.detail_ttl_secs,
            category_ttl_secs: settings.category_ttl_secs,
            download_ttl_secs: settings.download_ttl_secs,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    /// Sweep interval, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }

    pub fn category_ttl(&self) -> Duration {
        Duration::from_secs(self.category_ttl_secs)
    }

    pub fn download_ttl(&self) -> Duration {
        Duration::from_secs(self.download_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.category_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"max_entries": 50}"#).expect("deserialize");
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.default_ttl_secs, 300);
    }
}
