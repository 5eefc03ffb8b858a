use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::byterange::{RangeError, Ranges};
use crate::config::{BackendConfig, PathConfig};
use crate::constants;
use crate::document::{DocumentError, HttpDocument};
use crate::status::LookupStatus;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("compression failed: {0}")]
    Compress(String),
}

// Ambient per-request context threaded through the pipeline. A present span
// receives a `cache.status` attribute on lookups and write events; absence of
// a span is not an error.
#[derive(Debug, Default)]
pub struct Resources {
    pub path_config: Option<Arc<PathConfig>>,
    pub backend_config: Arc<BackendConfig>,
    pub span: Option<tracing::Span>,
}

impl Resources {
    pub fn new(backend_config: Arc<BackendConfig>) -> Self {
        Self {
            path_config: None,
            backend_config,
            span: None,
        }
    }

    pub fn with_path_config(mut self, path_config: Arc<PathConfig>) -> Self {
        self.path_config = Some(path_config);
        self
    }

    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }
}

// Span carrying the field the pipeline records into.
pub fn cache_span(operation: &'static str) -> tracing::Span {
    tracing::debug_span!("cache", op = operation, cache.status = tracing::field::Empty)
}

#[derive(Debug)]
pub struct CacheQueryResult {
    pub document: HttpDocument,
    pub status: LookupStatus,
    pub missing: Ranges,
    pub error: Option<EngineError>,
}

// Looks up `key` and classifies the result against the wanted byte ranges.
// Never mutates the store; cache failures degrade to misses so the caller can
// fall through to the origin. Dropping the returned future abandons the store
// operation without yielding a partial document.
pub async fn query_cache(
    rsc: &Resources,
    store: &dyn Store,
    key: &str,
    want_ranges: &Ranges,
) -> CacheQueryResult {
    let mut doc = if store.configuration().provider.is_reference() {
        match store.retrieve_reference(key, true).await {
            Ok(object) => match object.downcast::<HttpDocument>() {
                Ok(shared) => (*shared).clone(),
                Err(_) => {
                    log::error!("unexpected object type in reference cache: key={key}");
                    return miss(rsc, LookupStatus::KeyMiss, want_ranges, None);
                }
            },
            Err(err) => return store_failure(rsc, err, want_ranges),
        }
    } else {
        let blob = match store.retrieve(key, true).await {
            Ok(blob) => blob,
            Err(err) => return store_failure(rsc, err, want_ranges),
        };

        // strip the compression bit ahead of the payload
        let compressed = blob.first() == Some(&constants::COMPRESSION_SNAPPY);
        let payload = if blob.is_empty() { blob.clone() } else { blob.slice(1..) };
        let payload = if compressed {
            log::debug!("decompressing cached data: key={key}");
            match snap::raw::Decoder::new().decompress_vec(&payload) {
                Ok(raw) => Bytes::from(raw),
                Err(err) => {
                    // fall through with the post-bit payload; decode decides
                    log::debug!("snappy decompression failed for key={key}: {err}");
                    payload
                }
            }
        } else {
            payload
        };

        match HttpDocument::decode(&payload) {
            Ok(doc) => doc,
            Err(err) => {
                log::error!("error decoding cache document: key={key} detail={err}");
                return miss(rsc, LookupStatus::KeyMiss, want_ranges, Some(err.into()));
            }
        }
    };

    let mut status = LookupStatus::Hit;
    let mut want = want_ranges.clone();
    let mut missing = Ranges::new();

    // Fulfillment: only ranges are stored but the caller wants the whole
    // body, so the request is inflated to cover the entire object.
    if !doc.ranges.is_empty() && want.is_empty() {
        if doc.content_length < 0 {
            log::error!("range document without content length: key={key}");
            return miss(
                rsc,
                LookupStatus::KeyMiss,
                want_ranges,
                Some(RangeError::UnknownContentLength.into()),
            );
        }
        doc.mark_fulfillment();
        if let Some(span) = &rsc.span {
            span.in_scope(|| tracing::debug!("Cache Fulfillment"));
        }
        want = Ranges::single(0, doc.content_length - 1);
    }

    if !want.is_empty() && !doc.ranges.is_empty() {
        let resolved = match want.resolve(doc.content_length) {
            Ok(resolved) => resolved,
            Err(err) => return miss(rsc, LookupStatus::KeyMiss, want_ranges, Some(err.into())),
        };
        let delta = match want.calculate_delta(&doc.ranges, doc.content_length) {
            Ok(delta) => delta,
            Err(err) => return miss(rsc, LookupStatus::KeyMiss, want_ranges, Some(err.into())),
        };
        if !delta.is_empty() {
            status = if delta == resolved {
                LookupStatus::RangeMiss
            } else {
                LookupStatus::PartialHit
            };
            missing = delta;
        }
    }

    record_status(rsc, status);
    CacheQueryResult {
        document: doc,
        status,
        missing,
        error: None,
    }
}

// Persists a document under `key`. Byte stores get the serialized form behind
// the compression bit; reference stores get the live object with transient
// state re-zeroed.
pub async fn write_cache(
    rsc: &Resources,
    store: &dyn Store,
    key: &str,
    mut doc: HttpDocument,
    ttl: Duration,
    compressible_types: &HashSet<String>,
) -> Result<(), EngineError> {
    doc.strip_volatile_headers();
    let content_encoding = doc.content_encoding();

    let no_transform = doc.caching_policy.as_ref().is_some_and(|cp| cp.no_transform);
    let mut compress = false;
    if (content_encoding.is_empty() || content_encoding == "identity") && !no_transform {
        if let Ok(media_type) = doc.content_type.parse::<mime::Mime>() {
            compress = compressible_types.contains(media_type.essence_str());
        }
    }

    if store.configuration().provider.is_reference() {
        // a byte-store load re-zeros these, so direct access must observe
        // the same state
        doc.reset_transients();
        doc.range_parts.clear();
        if let Some(cp) = doc.caching_policy.as_mut() {
            cp.reset_client_conditionals();
        }
        return store
            .store_reference(key, Arc::new(doc), ttl)
            .await
            .map_err(Into::into);
    }

    let payload = doc.encode()?;
    let blob = if compress {
        log::debug!("compressing cache data: key={key}");
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&payload)
            .map_err(|err| EngineError::Compress(err.to_string()))?;
        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(constants::COMPRESSION_SNAPPY);
        out.extend_from_slice(&compressed);
        out
    } else {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(constants::COMPRESSION_NONE);
        out.extend_from_slice(&payload);
        out
    };

    let bytes_written = blob.len();
    match store.store(key, Bytes::from(blob), ttl).await {
        Ok(()) => {
            if let Some(span) = &rsc.span {
                span.in_scope(|| tracing::debug!(bytes_written, "Cache Write"));
            }
            Ok(())
        }
        Err(err) => {
            if let Some(span) = &rsc.span {
                span.in_scope(|| tracing::warn!(error = %err, "Cache Write Failure"));
            }
            Err(err.into())
        }
    }
}

fn record_status(rsc: &Resources, status: LookupStatus) {
    if let Some(span) = &rsc.span {
        span.record("cache.status", status.as_str());
    }
}

fn miss(
    rsc: &Resources,
    status: LookupStatus,
    want_ranges: &Ranges,
    error: Option<EngineError>,
) -> CacheQueryResult {
    record_status(rsc, status);
    let missing = if status == LookupStatus::KeyMiss && !want_ranges.is_empty() {
        want_ranges.clone()
    } else {
        Ranges::new()
    };
    CacheQueryResult {
        document: HttpDocument::new(),
        status,
        missing,
        error,
    }
}

fn store_failure(rsc: &Resources, err: StoreError, want_ranges: &Ranges) -> CacheQueryResult {
    match err {
        StoreError::NotFound(_) => miss(rsc, LookupStatus::KeyMiss, want_ranges, None),
        err => miss(rsc, LookupStatus::Error, want_ranges, Some(err.into())),
    }
}
