//! Cache configuration.
//!
//! Sizing and expiry for the in-memory store, resolved from `[cache]` settings.

use std::time::Duration;

const BYTES_PER_MB: usize = 1024 * 1024;

const DEFAULT_MAX_SIZE_MB: usize = 1024;
const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_CLEAN_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the bytes held by keys plus encoded entries.
    pub capacity_bytes: usize,
    /// Lifetime of an entry after it is written.
    pub ttl: Duration,
    /// Cadence of the background sweep that drops expired entries.
    pub clean_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_MAX_SIZE_MB * BYTES_PER_MB,
            ttl: DEFAULT_TTL,
            clean_interval: DEFAULT_CLEAN_INTERVAL,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity_bytes: (settings.max_size_mb.get() as usize).saturating_mul(BYTES_PER_MB),
            ttl: settings.ttl,
            clean_interval: settings.clean_interval,
        }
    }
}
