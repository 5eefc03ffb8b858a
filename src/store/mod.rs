use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;

// Live object handed through the reference path of a store; the pipeline
// downcasts it and treats anything unexpected as a key miss.
pub type StoredObject = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Memory,
    Filesystem,
    KeyValue,
    Remote,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Memory => "memory",
            Provider::Filesystem => "filesystem",
            Provider::KeyValue => "keyvalue",
            Provider::Remote => "remote",
        }
    }

    // Reference providers hand back live documents and skip serialization.
    pub fn is_reference(self) -> bool {
        matches!(self, Provider::Memory)
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfiguration {
    pub name: String,
    pub provider: Provider,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache key not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("reference operations not supported by this provider")]
    ReferenceUnsupported,
}

// Contract every cache provider presents to the pipeline. Stores only ever
// report hit, key-miss, or failure; range and partial-hit classification is
// the pipeline's concern. Implementations must be safe for concurrent use and
// must write blobs atomically.
#[async_trait]
pub trait Store: Send + Sync {
    fn configuration(&self) -> StoreConfiguration;

    async fn retrieve(&self, key: &str, allow_expired: bool) -> Result<Bytes, StoreError>;

    async fn store(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn retrieve_reference(&self, _key: &str, _allow_expired: bool) -> Result<StoredObject, StoreError> {
        Err(StoreError::ReferenceUnsupported)
    }

    async fn store_reference(&self, _key: &str, _object: StoredObject, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::ReferenceUnsupported)
    }
}
