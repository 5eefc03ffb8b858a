#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use url::Url;

use wayside::config::{BackendConfig, PathConfig};
use wayside::document::{document_from_response, CachingPolicy, HttpDocument};
use wayside::engine::Resources;
use wayside::key::CacheRequest;
use wayside::store::memory::MemoryStore;
use wayside::store::{Provider, Store, StoreConfiguration, StoreError, StoredObject};

pub fn resources() -> Resources {
    Resources::new(Arc::new(BackendConfig::default()))
}

pub fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(
            name.parse::<HeaderName>().expect("header name"),
            HeaderValue::from_str(value).expect("header value"),
        );
    }
    map
}

pub fn request(method: Method, url: &str, header_pairs: &[(&str, &str)]) -> CacheRequest {
    CacheRequest::new(
        method,
        Some(Url::parse(url).expect("url")),
        headers(header_pairs),
        None,
    )
}

pub fn path_config(params: &[&str], form_fields: &[&str]) -> PathConfig {
    PathConfig {
        path: "/".to_string(),
        cache_key_params: params.iter().map(|s| s.to_string()).collect(),
        cache_key_form_fields: form_fields.iter().map(|s| s.to_string()).collect(),
        ..PathConfig::default()
    }
}

pub fn text_doc(body: &str) -> HttpDocument {
    let hdrs = headers(&[
        ("content-type", "text/plain; charset=utf-8"),
        ("content-length", &body.len().to_string()),
        ("cache-control", "max-age=60"),
    ]);
    document_from_response(StatusCode::OK, hdrs, Bytes::copy_from_slice(body.as_bytes()), None)
        .expect("document")
}

// Single-range 206 document covering `start..=end` of a `total`-byte object.
pub fn range_doc(content: &[u8], start: i64, end: i64, total: i64) -> HttpDocument {
    let hdrs = headers(&[
        ("content-type", "text/plain"),
        ("content-range", &format!("bytes {start}-{end}/{total}")),
    ]);
    document_from_response(
        StatusCode::PARTIAL_CONTENT,
        hdrs,
        Bytes::copy_from_slice(content),
        Some(CachingPolicy::default()),
    )
    .expect("range document")
}

// Memory-backed store that presents itself as a byte provider, so tests can
// drive the serialize/compress path without touching a filesystem.
pub struct BlobStore {
    inner: MemoryStore,
}

impl BlobStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new("test-blob"),
        }
    }
}

#[async_trait]
impl Store for BlobStore {
    fn configuration(&self) -> StoreConfiguration {
        StoreConfiguration {
            name: "test-blob".to_string(),
            provider: Provider::Filesystem,
        }
    }

    async fn retrieve(&self, key: &str, allow_expired: bool) -> Result<Bytes, StoreError> {
        self.inner.retrieve(key, allow_expired).await
    }

    async fn store(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.inner.store(key, data, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }
}

// Store whose every operation fails, for exercising degradation paths.
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    fn configuration(&self) -> StoreConfiguration {
        StoreConfiguration {
            name: "test-failing".to_string(),
            provider: Provider::Remote,
        }
    }

    async fn retrieve(&self, _key: &str, _allow_expired: bool) -> Result<Bytes, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn store(&self, _key: &str, _data: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn retrieve_reference(&self, _key: &str, _allow_expired: bool) -> Result<StoredObject, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}
