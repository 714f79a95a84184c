//! Snapshot cache for the tiered gas price oracle.
//!
//! In-memory for single-process deployments, Redis-backed so multiple relay
//! processes share one upstream fetch.

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;

use crate::{
    constants::GAS_PRICE_CACHE_KEY,
    models::{GasPriceSnapshot, RepositoryError},
};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait GasPriceCacheTrait: Send + Sync {
    /// Returns the last stored snapshot, fresh or not, with `cached` set.
    /// Freshness is judged by the oracle against its own TTL so a stale
    /// snapshot can still serve as a fallback when the upstream is down.
    async fn get(&self) -> Result<Option<GasPriceSnapshot>, RepositoryError>;

    async fn set(&self, snapshot: &GasPriceSnapshot) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryGasPriceCache {
    snapshot: RwLock<Option<GasPriceSnapshot>>,
}

impl InMemoryGasPriceCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GasPriceCacheTrait for InMemoryGasPriceCache {
    async fn get(&self) -> Result<Option<GasPriceSnapshot>, RepositoryError> {
        Ok(self.snapshot.read().clone().map(|mut snapshot| {
            snapshot.cached = true;
            snapshot
        }))
    }

    async fn set(&self, snapshot: &GasPriceSnapshot) -> Result<(), RepositoryError> {
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(())
    }
}

pub struct RedisGasPriceCache {
    conn: ConnectionManager,
    key: String,
    /// Upper bound on how long a stale snapshot may linger in Redis.
    retention_secs: u64,
}

impl RedisGasPriceCache {
    pub fn new(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self {
            conn,
            key: GAS_PRICE_CACHE_KEY.to_string(),
            retention_secs: ttl_secs * 10,
        }
    }
}

#[async_trait]
impl GasPriceCacheTrait for RedisGasPriceCache {
    async fn get(&self) -> Result<Option<GasPriceSnapshot>, RepositoryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str::<GasPriceSnapshot>(&json)
                .map(|mut snapshot| {
                    snapshot.cached = true;
                    Some(snapshot)
                })
                .map_err(|e| RepositoryError::InvalidData(e.to_string())),
        }
    }

    async fn set(&self, snapshot: &GasPriceSnapshot) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(&self.key)
            .arg(json)
            .arg("EX")
            .arg(self.retention_secs)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

/// Cache implementations selected at startup.
pub enum GasPriceCacheStorage {
    InMemory(InMemoryGasPriceCache),
    Redis(RedisGasPriceCache),
}

#[async_trait]
impl GasPriceCacheTrait for GasPriceCacheStorage {
    async fn get(&self) -> Result<Option<GasPriceSnapshot>, RepositoryError> {
        match self {
            GasPriceCacheStorage::InMemory(cache) => cache.get().await,
            GasPriceCacheStorage::Redis(cache) => cache.get().await,
        }
    }

    async fn set(&self, snapshot: &GasPriceSnapshot) -> Result<(), RepositoryError> {
        match self {
            GasPriceCacheStorage::InMemory(cache) => cache.set(snapshot).await,
            GasPriceCacheStorage::Redis(cache) => cache.set(snapshot).await,
        }
    }
}
