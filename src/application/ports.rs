//! Capability traits describing the cache and object-store adapters.

use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// An object as returned by the backing store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found")]
    NotFound,
    #[error("object store transport error")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),
}

impl ObjectStoreError {
    pub fn transport(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Transport(err.into())
    }
}

#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("entry of {size} bytes exceeds cache capacity of {capacity} bytes")]
    EntryTooLarge { size: usize, capacity: usize },
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Read access to the authoritative object store.
///
/// Implementations must be safe for unsynchronized concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<StoredObject, ObjectStoreError>;
}

/// Byte-buffer cache with tag-scoped bulk invalidation.
///
/// Implementations own their eviction and expiry policy and must be safe for
/// unsynchronized concurrent use.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError>;

    async fn set(&self, key: &str, value: Bytes, tag: &str) -> Result<(), CacheStoreError>;

    /// Drop every entry stored under `tag`, returning how many were removed.
    async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheStoreError>;
}
