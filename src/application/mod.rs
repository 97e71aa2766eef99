//! Application services: the retrieval pipeline, invalidation and accounting.

pub mod error;
pub mod invalidation;
pub mod ports;
pub mod retrieval;
pub mod stats;

pub use invalidation::{InvalidationError, InvalidationService};
pub use ports::{CacheStore, CacheStoreError, ObjectStore, ObjectStoreError, StoredObject};
pub use retrieval::{CacheOutcome, RetrievalError, RetrievalRequest, RetrievalService, Retrieved};
pub use stats::{HitMissCounters, StatsSnapshot};
