// Namespaced TTL cache. The store owns hit/miss accounting and expiry; the
// backend only holds entries. Any backend fault is logged and reads as a miss.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use creatorsignal_common::CacheConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub namespace: String,
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Where entries live. Keys arrive already namespaced.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>>;
    async fn store(&self, key: String, entry: CacheEntry) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<bool>;
    /// Remove every entry in `namespace`, returning how many were dropped.
    async fn remove_namespace(&self, namespace: &str) -> Result<usize>;
    /// Live (unexpired) entry count.
    async fn len(&self) -> Result<usize>;
}

/// In-process backend.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, key: String, entry: CacheEntry) -> Result<()> {
        self.entries.write().await.insert(key, entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn remove_namespace(&self, namespace: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.namespace != namespace);
        Ok(before - entries.len())
    }

    async fn len(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired(now));
        Ok(entries.len())
    }
}

pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_backend(config, Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Length-prefixed so `("a:b", "c")` and `("a", "b:c")` stay distinct.
    fn compose_key(namespace: &str, key: &str) -> String {
        format!("{}:{namespace}:{key}", namespace.len())
    }

    /// Fetch a live entry. Expired entries, undecodable values and backend
    /// faults all count as a miss.
    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let full_key = Self::compose_key(namespace, key);
        let entry = match self.backend.load(&full_key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(namespace, key, error = %e, "cache: backend read failed, treating as miss");
                None
            }
        };

        let value = match entry {
            Some(entry) if entry.is_expired(Instant::now()) => {
                debug!(namespace, key, "cache: entry expired");
                if let Err(e) = self.backend.remove(&full_key).await {
                    warn!(namespace, key, error = %e, "cache: failed to evict expired entry");
                }
                None
            }
            Some(entry) => match serde_json::from_value(entry.value) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(namespace, key, error = %e, "cache: stored value has unexpected shape");
                    None
                }
            },
            None => None,
        };

        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Store a value, replacing any previous entry wholesale. `ttl: None` uses
    /// the namespace TTL, or the store default when the namespace has none.
    pub async fn set<T: Serialize>(&self, namespace: &str, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(namespace, key, error = %e, "cache: value not serializable, skipping");
                return;
            }
        };
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_for(namespace));
        let entry = CacheEntry {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Err(e) = self.backend.store(Self::compose_key(namespace, key), entry).await {
            warn!(namespace, key, error = %e, "cache: backend write failed");
        }
    }

    pub async fn del(&self, namespace: &str, key: &str) -> bool {
        self.backend
            .remove(&Self::compose_key(namespace, key))
            .await
            .unwrap_or_else(|e| {
                warn!(namespace, key, error = %e, "cache: backend delete failed");
                false
            })
    }

    pub async fn flush(&self, namespace: &str) -> usize {
        self.backend
            .remove_namespace(namespace)
            .await
            .unwrap_or_else(|e| {
                warn!(namespace, error = %e, "cache: backend flush failed");
                0
            })
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.backend.len().await.unwrap_or_else(|e| {
            warn!(error = %e, "cache: backend length unavailable");
            0
        });
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
