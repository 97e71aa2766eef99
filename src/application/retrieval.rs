//! Retrieval pipeline: selector check, cache lookup, object fetch with the
//! directory-index fallback, then store-and-serve.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::domain::{CacheKey, CachedEntry, DecodeError, Selector, SelectorError, is_directory_candidate};

use super::{
    error::HttpError,
    ports::{CacheStore, CacheStoreError, ObjectStore, ObjectStoreError, StoredObject},
    stats::HitMissCounters,
};

const SOURCE: &str = "application::retrieval";
const INDEX_DOCUMENT_SUFFIX: &str = "/index.html";

/// One inbound request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub method: Method,
    /// Raw value of the selector header, if present.
    pub selector: Option<String>,
    /// Request path as received, still percent-encoded.
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

impl CacheOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Retrieved {
    pub entry: CachedEntry,
    pub outcome: CacheOutcome,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("selector header missing")]
    MissingSelector,
    #[error("method `{0}` not allowed")]
    MethodNotAllowed(Method),
    #[error(transparent)]
    InvalidSelector(#[from] SelectorError),
    #[error("request path `{path}` is not valid UTF-8 once decoded")]
    InvalidPath {
        path: String,
        #[source]
        source: std::str::Utf8Error,
    },
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("failed to fetch `{key}` from object store")]
    StoreTransport {
        key: String,
        #[source]
        source: ObjectStoreError,
    },
    #[error("cached entry `{key}` is corrupt")]
    CorruptEntry {
        key: String,
        #[source]
        source: DecodeError,
    },
    #[error("failed to write `{key}` to cache")]
    CacheWrite {
        key: String,
        #[source]
        source: CacheStoreError,
    },
}

impl From<RetrievalError> for HttpError {
    fn from(error: RetrievalError) -> Self {
        match &error {
            RetrievalError::MissingSelector => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "", &error)
            }
            RetrievalError::MethodNotAllowed(_) => {
                HttpError::from_error(SOURCE, StatusCode::METHOD_NOT_ALLOWED, "", &error)
            }
            RetrievalError::InvalidPath { .. } => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "", &error)
            }
            // The selector header belongs to the fronting proxy, so a bad value
            // is a deployment fault rather than a client mistake.
            RetrievalError::InvalidSelector(err) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                &error,
            ),
            RetrievalError::NotFound { .. } => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "", &error)
            }
            RetrievalError::StoreTransport { .. }
            | RetrievalError::CorruptEntry { .. }
            | RetrievalError::CacheWrite { .. } => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

/// Bounded fetch schedule: a direct lookup, then at most one index fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchAttempt {
    Direct,
    IndexFallback,
}

impl FetchAttempt {
    fn next(self, directory_candidate: bool) -> Option<Self> {
        match self {
            Self::Direct if directory_candidate => Some(Self::IndexFallback),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct RetrievalService {
    cache: Arc<dyn CacheStore>,
    objects: Arc<dyn ObjectStore>,
    stats: Arc<HitMissCounters>,
}

impl RetrievalService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        objects: Arc<dyn ObjectStore>,
        stats: Arc<HitMissCounters>,
    ) -> Self {
        Self {
            cache,
            objects,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<HitMissCounters> {
        &self.stats
    }

    #[instrument(skip_all, fields(path = %request.path))]
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<Retrieved, RetrievalError> {
        let raw_selector = request
            .selector
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .ok_or(RetrievalError::MissingSelector)?;

        if request.method != Method::GET {
            return Err(RetrievalError::MethodNotAllowed(request.method));
        }

        let selector = Selector::parse(raw_selector)?;
        let path = percent_decode_str(&request.path)
            .decode_utf8()
            .map_err(|source| RetrievalError::InvalidPath {
                path: request.path.clone(),
                source,
            })?;
        let key = selector.cache_key(&path);

        if let Some(entry) = self.lookup(&key).await? {
            debug!(key = %key, outcome = "hit", "serving cached entry");
            self.stats.record_hit();
            return Ok(Retrieved {
                entry,
                outcome: CacheOutcome::Hit,
            });
        }

        let object = self.fetch(&key, &path).await?;
        let entry = CachedEntry::from_object(object.content_type, object.body);

        // Stored under the requested key, not the index-fallback key.
        self.cache
            .set(key.as_str(), entry.encode(), selector.as_str())
            .await
            .map_err(|source| RetrievalError::CacheWrite {
                key: key.to_string(),
                source,
            })?;

        debug!(key = %key, outcome = "miss", bytes = entry.body.len(), "cached fetched object");
        self.stats.record_miss();
        Ok(Retrieved {
            entry,
            outcome: CacheOutcome::Miss,
        })
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedEntry>, RetrievalError> {
        let raw = match self.cache.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed, treating as miss");
                return Ok(None);
            }
        };

        // A corrupt slot keeps failing until it expires or is invalidated.
        CachedEntry::decode(&raw)
            .map(Some)
            .map_err(|source| RetrievalError::CorruptEntry {
                key: key.to_string(),
                source,
            })
    }

    async fn fetch(&self, key: &CacheKey, path: &str) -> Result<StoredObject, RetrievalError> {
        let directory_candidate = is_directory_candidate(path);
        let mut lookup_key = key.lookup_key();
        let mut attempt = FetchAttempt::Direct;

        loop {
            match self.objects.fetch(&lookup_key).await {
                Ok(object) => return Ok(object),
                Err(ObjectStoreError::NotFound) => match attempt.next(directory_candidate) {
                    Some(next) => {
                        debug!(key = %lookup_key, "object missing, trying index document");
                        lookup_key.push_str(INDEX_DOCUMENT_SUFFIX);
                        attempt = next;
                    }
                    None => return Err(RetrievalError::NotFound { key: lookup_key }),
                },
                Err(source) => {
                    return Err(RetrievalError::StoreTransport {
                        key: lookup_key,
                        source,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;

    #[derive(Default)]
    struct FakeObjects {
        objects: HashMap<String, StoredObject>,
        fail_with_transport: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeObjects {
        fn with(mut self, key: &str, content_type: Option<&str>, body: &'static [u8]) -> Self {
            self.objects.insert(
                key.to_string(),
                StoredObject {
                    body: Bytes::from_static(body),
                    content_type: content_type.map(str::to_string),
                },
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ObjectStore for FakeObjects {
        async fn fetch(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
            self.calls.lock().expect("calls lock").push(key.to_string());
            if self.fail_with_transport {
                return Err(ObjectStoreError::transport("connection reset"));
            }
            self.objects
                .get(key)
                .cloned()
                .ok_or(ObjectStoreError::NotFound)
        }
    }

    #[derive(Default)]
    struct FakeCache {
        entries: Mutex<HashMap<String, (Bytes, String)>>,
        reject_writes: bool,
        fail_reads: bool,
    }

    #[async_trait]
    impl CacheStore for FakeCache {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheStoreError> {
            if self.fail_reads {
                return Err(CacheStoreError::Backend("unavailable".into()));
            }
            Ok(self
                .entries
                .lock()
                .expect("entries lock")
                .get(key)
                .map(|(value, _)| value.clone()))
        }

        async fn set(&self, key: &str, value: Bytes, tag: &str) -> Result<(), CacheStoreError> {
            if self.reject_writes {
                return Err(CacheStoreError::EntryTooLarge {
                    size: value.len(),
                    capacity: 0,
                });
            }
            self.entries
                .lock()
                .expect("entries lock")
                .insert(key.to_string(), (value, tag.to_string()));
            Ok(())
        }

        async fn invalidate_tag(&self, tag: &str) -> Result<usize, CacheStoreError> {
            let mut entries = self.entries.lock().expect("entries lock");
            let before = entries.len();
            entries.retain(|_, (_, entry_tag)| entry_tag != tag);
            Ok(before - entries.len())
        }
    }

    fn service(cache: Arc<FakeCache>, objects: Arc<FakeObjects>) -> RetrievalService {
        RetrievalService::new(cache, objects, Arc::new(HitMissCounters::new()))
    }

    fn get(selector: Option<&str>, path: &str) -> RetrievalRequest {
        RetrievalRequest {
            method: Method::GET,
            selector: selector.map(str::to_string),
            path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_selector_is_checked_before_method() {
        let svc = service(Arc::default(), Arc::default());
        let request = RetrievalRequest {
            method: Method::POST,
            selector: None,
            path: "/x".into(),
        };
        assert!(matches!(
            svc.retrieve(request).await,
            Err(RetrievalError::MissingSelector)
        ));
    }

    #[tokio::test]
    async fn non_get_is_rejected() {
        let svc = service(Arc::default(), Arc::default());
        let request = RetrievalRequest {
            method: Method::PUT,
            selector: Some("tenantA".into()),
            path: "/x".into(),
        };
        assert!(matches!(
            svc.retrieve(request).await,
            Err(RetrievalError::MethodNotAllowed(m)) if m == Method::PUT
        ));
    }

    #[tokio::test]
    async fn invalid_selector_never_reaches_stores() {
        let objects = Arc::new(FakeObjects::default());
        let svc = service(Arc::default(), objects.clone());
        let result = svc.retrieve(get(Some("a/b"), "/x")).await;
        assert!(matches!(result, Err(RetrievalError::InvalidSelector(_))));
        assert!(objects.calls().is_empty());
    }

    #[tokio::test]
    async fn miss_then_hit_serves_identical_entry() {
        let cache = Arc::new(FakeCache::default());
        let objects = Arc::new(FakeObjects::default().with(
            "/tenantA/file.txt",
            Some("text/plain"),
            b"hello",
        ));
        let svc = service(cache.clone(), objects.clone());

        let first = svc.retrieve(get(Some("tenantA"), "/file.txt")).await.expect("miss");
        assert_eq!(first.outcome, CacheOutcome::Miss);

        let second = svc.retrieve(get(Some("tenantA"), "/file.txt")).await.expect("hit");
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(second.entry, first.entry);
        assert_eq!(second.entry.content_type, "text/plain");

        assert_eq!(objects.calls(), vec!["/tenantA/file.txt".to_string()]);
        let stats = svc.stats().snapshot();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn directory_request_falls_back_to_index_once() {
        let cache = Arc::new(FakeCache::default());
        let objects = Arc::new(FakeObjects::default().with(
            "/tenantA/docs/index.html",
            Some("text/html"),
            b"<h1>docs</h1>",
        ));
        let svc = service(cache.clone(), objects.clone());

        let result = svc.retrieve(get(Some("tenantA"), "/docs/")).await.expect("index");
        assert_eq!(result.entry.body, Bytes::from_static(b"<h1>docs</h1>"));
        assert_eq!(
            objects.calls(),
            vec![
                "/tenantA/docs".to_string(),
                "/tenantA/docs/index.html".to_string()
            ]
        );

        // Cached under the requested key, not the fallback key.
        let entries = cache.entries.lock().expect("entries lock");
        assert!(entries.contains_key("/tenantA/docs/"));
        assert!(!entries.contains_key("/tenantA/docs/index.html"));
    }

    #[tokio::test]
    async fn fallback_is_bounded_to_two_fetches() {
        let objects = Arc::new(FakeObjects::default());
        let svc = service(Arc::default(), objects.clone());

        let result = svc.retrieve(get(Some("t"), "/a/b/")).await;
        assert!(matches!(
            result,
            Err(RetrievalError::NotFound { ref key }) if key == "/t/a/b/index.html"
        ));
        assert_eq!(objects.calls().len(), 2);
    }

    #[tokio::test]
    async fn file_like_paths_do_not_fall_back() {
        let objects = Arc::new(FakeObjects::default());
        let svc = service(Arc::default(), objects.clone());

        let result = svc.retrieve(get(Some("t"), "/missing.css")).await;
        assert!(matches!(result, Err(RetrievalError::NotFound { .. })));
        assert_eq!(objects.calls(), vec!["/t/missing.css".to_string()]);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let objects = Arc::new(FakeObjects {
            fail_with_transport: true,
            ..Default::default()
        });
        let svc = service(Arc::default(), objects.clone());

        let result = svc.retrieve(get(Some("t"), "/docs")).await;
        assert!(matches!(result, Err(RetrievalError::StoreTransport { .. })));
        assert_eq!(objects.calls().len(), 1);
        assert_eq!(svc.stats().snapshot().misses, 0);
    }

    #[tokio::test]
    async fn cache_write_failure_fails_the_request() {
        let cache = Arc::new(FakeCache {
            reject_writes: true,
            ..Default::default()
        });
        let objects = Arc::new(FakeObjects::default().with("/t/a.txt", None, b"a"));
        let svc = service(cache, objects);

        let result = svc.retrieve(get(Some("t"), "/a.txt")).await;
        assert!(matches!(result, Err(RetrievalError::CacheWrite { .. })));
        assert_eq!(svc.stats().snapshot().misses, 0);
    }

    #[tokio::test]
    async fn cache_read_failure_degrades_to_miss() {
        let cache = Arc::new(FakeCache {
            fail_reads: true,
            ..Default::default()
        });
        let objects = Arc::new(FakeObjects::default().with("/t/a.txt", None, b"a"));
        let svc = service(cache, objects);

        let result = svc.retrieve(get(Some("t"), "/a.txt")).await.expect("served");
        assert_eq!(result.outcome, CacheOutcome::Miss);
        assert_eq!(result.entry.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn corrupt_entry_is_reported_and_kept() {
        let cache = Arc::new(FakeCache::default());
        cache.entries.lock().expect("entries lock").insert(
            "/t/a.txt".into(),
            (Bytes::from_static(b"no delimiter"), "t".into()),
        );
        let objects = Arc::new(FakeObjects::default().with("/t/a.txt", None, b"a"));
        let svc = service(cache.clone(), objects.clone());

        for _ in 0..2 {
            let result = svc.retrieve(get(Some("t"), "/a.txt")).await;
            assert!(matches!(result, Err(RetrievalError::CorruptEntry { .. })));
        }
        assert!(objects.calls().is_empty());
        assert_eq!(svc.stats().snapshot(), HitMissCounters::new().snapshot());
    }

    #[tokio::test]
    async fn empty_selector_counts_as_missing() {
        let objects = Arc::new(FakeObjects::default());
        let svc = service(Arc::default(), objects.clone());

        let result = svc.retrieve(get(Some(""), "/x")).await;
        assert!(matches!(result, Err(RetrievalError::MissingSelector)));
        assert!(objects.calls().is_empty());
    }

    #[tokio::test]
    async fn paths_are_percent_decoded_before_keying() {
        let cache = Arc::new(FakeCache::default());
        let objects = Arc::new(FakeObjects::default().with("/t/my file.txt", None, b"spaced"));
        let svc = service(cache.clone(), objects.clone());

        let retrieved = svc
            .retrieve(get(Some("t"), "/my%20file.txt"))
            .await
            .expect("decoded path resolves");
        assert_eq!(retrieved.entry.body, Bytes::from_static(b"spaced"));
        assert_eq!(objects.calls(), vec!["/t/my file.txt".to_string()]);
        assert!(
            cache
                .entries
                .lock()
                .expect("entries lock")
                .contains_key("/t/my file.txt")
        );
    }

    #[tokio::test]
    async fn undecodable_path_is_a_bad_request() {
        let objects = Arc::new(FakeObjects::default());
        let svc = service(Arc::default(), objects.clone());

        let result = svc.retrieve(get(Some("t"), "/bad%FF.txt")).await;
        let err = result.expect_err("invalid utf-8");
        assert!(matches!(err, RetrievalError::InvalidPath { .. }));
        assert_eq!(HttpError::from(err).status(), StatusCode::BAD_REQUEST);
        assert!(objects.calls().is_empty());
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (RetrievalError::MissingSelector, StatusCode::BAD_REQUEST),
            (
                RetrievalError::MethodNotAllowed(Method::POST),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                RetrievalError::InvalidSelector(SelectorError::Empty),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RetrievalError::NotFound { key: "/t/x".into() },
                StatusCode::NOT_FOUND,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(HttpError::from(error).status(), status);
        }
    }
}
