use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{Provider, Store, StoreConfiguration, StoreError, StoredObject};

// In-process store. Serves both contract paths: serialized blobs through
// retrieve/store and live documents through the reference calls. Entries are
// evicted FIFO once the optional entry limit is reached; expired entries stay
// readable to allow-expired callers until overwritten.
pub struct MemoryStore {
    name: String,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    map: HashMap<String, Entry>,
    order: VecDeque<String>,
    max_entries: Option<usize>,
}

struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Clone)]
enum Stored {
    Blob(Bytes),
    Reference(StoredObject),
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self::with_limit(name, None)
    }

    pub fn with_limit(name: &str, max_entries: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                max_entries: max_entries.filter(|v| *v > 0),
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn get(&self, key: &str, allow_expired: bool) -> Result<Stored, StoreError> {
        let inner = self.inner.read().await;
        let entry = inner.map.get(key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if entry.is_expired() && !allow_expired {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(entry.value.clone())
    }

    async fn put(&self, key: &str, value: Stored, ttl: Duration) {
        let mut inner = self.inner.write().await;
        if !inner.map.contains_key(key) {
            if let Some(max) = inner.max_entries {
                while inner.map.len() >= max {
                    if let Some(old) = inner.order.pop_front() {
                        inner.map.remove(&old);
                    } else {
                        break;
                    }
                }
            }
            inner.order.push_back(key.to_string());
        }
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        inner.map.insert(key.to_string(), Entry { value, expires_at });
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn configuration(&self) -> StoreConfiguration {
        StoreConfiguration {
            name: self.name.clone(),
            provider: Provider::Memory,
        }
    }

    async fn retrieve(&self, key: &str, allow_expired: bool) -> Result<Bytes, StoreError> {
        match self.get(key, allow_expired).await? {
            Stored::Blob(data) => Ok(data),
            Stored::Reference(_) => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn store(&self, key: &str, data: Bytes, ttl: Duration) -> Result<(), StoreError> {
        self.put(key, Stored::Blob(data), ttl).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.map.remove(key).is_some() {
            if let Some(pos) = inner.order.iter().position(|k| k == key) {
                inner.order.remove(pos);
            }
        }
        Ok(())
    }

    async fn retrieve_reference(&self, key: &str, allow_expired: bool) -> Result<StoredObject, StoreError> {
        match self.get(key, allow_expired).await? {
            Stored::Reference(object) => Ok(object),
            Stored::Blob(_) => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn store_reference(&self, key: &str, object: StoredObject, ttl: Duration) -> Result<(), StoreError> {
        self.put(key, Stored::Reference(object), ttl).await;
        Ok(())
    }
}
