//! Selector-scoped cache purge.

use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::domain::{Selector, SelectorError};

use super::{
    error::HttpError,
    ports::{CacheStore, CacheStoreError},
};

const SOURCE: &str = "application::invalidation";

#[derive(Debug, Error)]
pub enum InvalidationError {
    #[error(transparent)]
    InvalidSelector(#[from] SelectorError),
    #[error("failed to invalidate cache entries tagged `{selector}`")]
    Store {
        selector: String,
        #[source]
        source: CacheStoreError,
    },
}

impl From<InvalidationError> for HttpError {
    fn from(error: InvalidationError) -> Self {
        match &error {
            InvalidationError::InvalidSelector(err) => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, err.to_string(), &error)
            }
            InvalidationError::Store { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

#[derive(Clone)]
pub struct InvalidationService {
    cache: Arc<dyn CacheStore>,
}

impl InvalidationService {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Drop every cached entry produced under `raw_selector`.
    ///
    /// Succeeds even when nothing was cached for the selector.
    pub async fn invalidate(&self, raw_selector: &str) -> Result<usize, InvalidationError> {
        let selector = Selector::parse(raw_selector)?;

        let removed = self
            .cache
            .invalidate_tag(selector.as_str())
            .await
            .map_err(|source| InvalidationError::Store {
                selector: selector.to_string(),
                source,
            })?;

        info!(
            target = "magicbox::invalidation",
            selector = %selector,
            removed,
            "Invalidated cache entries"
        );
        Ok(removed)
    }
}
