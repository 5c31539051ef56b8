//! Compiled-rule caching
//!
//! The repository talks to its cache through the [`RuleCache`] contract so the
//! backend can be swapped. [`Cache`] is the in-process backend: a keyed store
//! whose entries optionally expire, but which is normally cleared only by
//! explicit invalidation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CacheConfig;
use crate::models::CompiledRuleMap;
use crate::utils::AppResult;

/// Cache entry with insertion tracking
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub inserted_at: Instant,
    /// `None` means the entry lives until removed
    pub ttl: Option<Duration>,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Option<Duration>) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.inserted_at.elapsed() > ttl)
            .unwrap_or(false)
    }
}

/// Generic keyed cache with optional expiry
#[derive(Debug)]
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    default_ttl: Option<Duration>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Build from configuration; a zero TTL disables expiry
    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self::new(ttl)
    }

    /// Get a value from cache if it exists and is not expired
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone())
    }

    /// Set a value, replacing any previous entry wholesale
    pub async fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry::new(value, self.default_ttl));
    }

    /// Remove a value from cache
    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries.remove(key).map(|e| e.data)
    }
}

/// Storage contract for the compiled-rule map
///
/// Errors mean the backend is unavailable; callers treat them as a miss.
#[async_trait]
pub trait RuleCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<Arc<CompiledRuleMap>>>;
    async fn set(&self, key: &str, rules: Arc<CompiledRuleMap>) -> AppResult<()>;
    async fn remove(&self, key: &str) -> AppResult<()>;
}

/// In-process cache of compiled-rule snapshots
pub type CompiledRuleCache = Cache<String, Arc<CompiledRuleMap>>;

#[async_trait]
impl RuleCache for CompiledRuleCache {
    async fn get(&self, key: &str) -> AppResult<Option<Arc<CompiledRuleMap>>> {
        let hit = Cache::get(self, &key.to_string()).await;
        debug!(key, hit = hit.is_some(), "Compiled rule cache lookup");
        Ok(hit)
    }

    async fn set(&self, key: &str, rules: Arc<CompiledRuleMap>) -> AppResult<()> {
        Cache::set(self, key.to_string(), rules).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        Cache::remove(self, &key.to_string()).await;
        Ok(())
    }
}
