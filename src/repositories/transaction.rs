//! Idempotency store for completed relays.
//!
//! Records are keyed by payload hash with a unique constraint: `create` for a
//! key that already exists fails with `AlreadyExists`, which callers treat as
//! benign. Records are never mutated or deleted.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;

use crate::{
    constants::TRANSACTION_RECORDS_KEY,
    models::{RepositoryError, TransactionRecord},
};

#[cfg(test)]
use mockall::automock;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait TransactionRepositoryTrait: Send + Sync {
    async fn find_by_payload_hash(
        &self,
        payload_hash: &str,
    ) -> Result<Option<TransactionRecord>, RepositoryError>;

    /// Fails with `RepositoryError::AlreadyExists` when the payload hash was
    /// already recorded.
    async fn create(&self, record: TransactionRecord) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    records: DashMap<String, TransactionRecord>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepositoryTrait for InMemoryTransactionRepository {
    async fn find_by_payload_hash(
        &self,
        payload_hash: &str,
    ) -> Result<Option<TransactionRecord>, RepositoryError> {
        Ok(self.records.get(payload_hash).map(|r| r.clone()))
    }

    async fn create(&self, record: TransactionRecord) -> Result<(), RepositoryError> {
        match self.records.entry(record.payload_hash.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepositoryError::AlreadyExists(
                record.payload_hash.clone(),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }
}

pub struct RedisTransactionRepository {
    conn: ConnectionManager,
    key: String,
}

impl RedisTransactionRepository {
    pub fn new(conn: ConnectionManager, key_prefix: &str) -> Self {
        Self {
            conn,
            key: format!("{key_prefix}:{TRANSACTION_RECORDS_KEY}"),
        }
    }
}

#[async_trait]
impl TransactionRepositoryTrait for RedisTransactionRepository {
    async fn find_by_payload_hash(
        &self,
        payload_hash: &str,
    ) -> Result<Option<TransactionRecord>, RepositoryError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(&self.key)
            .arg(payload_hash)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| RepositoryError::InvalidData(e.to_string())),
        }
    }

    async fn create(&self, record: TransactionRecord) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(&record)
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
        let mut conn = self.conn.clone();
        // HSETNX carries the unique constraint.
        let inserted: i64 = redis::cmd("HSETNX")
            .arg(&self.key)
            .arg(&record.payload_hash)
            .arg(json)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        if inserted == 0 {
            return Err(RepositoryError::AlreadyExists(record.payload_hash));
        }
        Ok(())
    }
}

pub enum TransactionRepositoryStorage {
    InMemory(InMemoryTransactionRepository),
    Redis(RedisTransactionRepository),
}

#[async_trait]
impl TransactionRepositoryTrait for TransactionRepositoryStorage {
    async fn find_by_payload_hash(
        &self,
        payload_hash: &str,
    ) -> Result<Option<TransactionRecord>, RepositoryError> {
        match self {
            TransactionRepositoryStorage::InMemory(repo) => {
                repo.find_by_payload_hash(payload_hash).await
            }
            TransactionRepositoryStorage::Redis(repo) => {
                repo.find_by_payload_hash(payload_hash).await
            }
        }
    }

    async fn create(&self, record: TransactionRecord) -> Result<(), RepositoryError> {
        match self {
            TransactionRepositoryStorage::InMemory(repo) => repo.create(record).await,
            TransactionRepositoryStorage::Redis(repo) => repo.create(record).await,
        }
    }
}
