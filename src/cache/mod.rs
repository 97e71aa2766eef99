//! Magicbox cache store.
//!
//! Holds encoded entries in memory, bounded by total bytes, each tagged with
//! the selector that produced it so a whole tenant can be dropped at once.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_size_mb = 1024
//! ttl_seconds = 2592000
//! clean_interval_seconds = 3600
//! ```

mod config;
mod lock;
mod store;

pub use config::CacheConfig;
pub use store::{
    METRIC_CACHE_EVICT, METRIC_CACHE_EXPIRED, METRIC_CACHE_INVALIDATED, MemoryCacheStore,
};
