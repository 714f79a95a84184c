//! Append-only audit logs for relay attempts, successes and failures, plus a
//! transaction hash to sender lookup map. Purely for observability and
//! forensics; nothing on the read path depends on these.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;

use crate::{
    constants::{
        RELAY_TX_ATTEMPTS_KEY, RELAY_TX_FAILURES_KEY, RELAY_TX_SUCCESSES_KEY,
        TX_HASH_TO_SENDER_KEY,
    },
    models::{AuditEntry, RepositoryError},
};

#[cfg(test)]
use mockall::automock;

#[async_trait]
#[cfg_attr(test, automock)]
pub trait AuditLogTrait: Send + Sync {
    async fn log_attempt(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;
    async fn log_success(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;
    async fn log_failure(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;
    async fn map_tx_hash_to_sender(
        &self,
        tx_hash: &str,
        sender_address: &str,
    ) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    attempts: Mutex<Vec<AuditEntry>>,
    successes: Mutex<Vec<AuditEntry>>,
    failures: Mutex<Vec<AuditEntry>>,
    tx_hash_to_sender: DashMap<String, String>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<AuditEntry> {
        self.attempts.lock().clone()
    }

    pub fn successes(&self) -> Vec<AuditEntry> {
        self.successes.lock().clone()
    }

    pub fn failures(&self) -> Vec<AuditEntry> {
        self.failures.lock().clone()
    }

    pub fn sender_for(&self, tx_hash: &str) -> Option<String> {
        self.tx_hash_to_sender.get(tx_hash).map(|s| s.clone())
    }
}

#[async_trait]
impl AuditLogTrait for InMemoryAuditLog {
    async fn log_attempt(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.attempts.lock().push(entry.clone());
        Ok(())
    }

    async fn log_success(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.successes.lock().push(entry.clone());
        Ok(())
    }

    async fn log_failure(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.failures.lock().push(entry.clone());
        Ok(())
    }

    async fn map_tx_hash_to_sender(
        &self,
        tx_hash: &str,
        sender_address: &str,
    ) -> Result<(), RepositoryError> {
        self.tx_hash_to_sender
            .insert(tx_hash.to_string(), sender_address.to_string());
        Ok(())
    }
}

pub struct RedisAuditLog {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisAuditLog {
    pub fn new(conn: ConnectionManager, key_prefix: &str) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.to_string(),
        }
    }

    /// Sorted-set append scored by the entry timestamp, so the logs stay
    /// ordered and range-queryable by time.
    async fn zadd(&self, log_key: &str, entry: &AuditEntry) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(entry)
            .map_err(|e| RepositoryError::InvalidData(e.to_string()))?;
        let mut conn = self.conn.clone();
        redis::cmd("ZADD")
            .arg(format!("{}:{}", self.key_prefix, log_key))
            .arg(entry.timestamp)
            .arg(json)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditLogTrait for RedisAuditLog {
    async fn log_attempt(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.zadd(RELAY_TX_ATTEMPTS_KEY, entry).await
    }

    async fn log_success(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.zadd(RELAY_TX_SUCCESSES_KEY, entry).await
    }

    async fn log_failure(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        self.zadd(RELAY_TX_FAILURES_KEY, entry).await
    }

    async fn map_tx_hash_to_sender(
        &self,
        tx_hash: &str,
        sender_address: &str,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(format!("{}:{}", self.key_prefix, TX_HASH_TO_SENDER_KEY))
            .arg(tx_hash)
            .arg(sender_address)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

pub enum AuditLogStorage {
    InMemory(InMemoryAuditLog),
    Redis(RedisAuditLog),
}

#[async_trait]
impl AuditLogTrait for AuditLogStorage {
    async fn log_attempt(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        match self {
            AuditLogStorage::InMemory(log) => log.log_attempt(entry).await,
            AuditLogStorage::Redis(log) => log.log_attempt(entry).await,
        }
    }

    async fn log_success(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        match self {
            AuditLogStorage::InMemory(log) => log.log_success(entry).await,
            AuditLogStorage::Redis(log) => log.log_success(entry).await,
        }
    }

    async fn log_failure(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        match self {
            AuditLogStorage::InMemory(log) => log.log_failure(entry).await,
            AuditLogStorage::Redis(log) => log.log_failure(entry).await,
        }
    }

    async fn map_tx_hash_to_sender(
        &self,
        tx_hash: &str,
        sender_address: &str,
    ) -> Result<(), RepositoryError> {
        match self {
            AuditLogStorage::InMemory(log) => {
                log.map_tx_hash_to_sender(tx_hash, sender_address).await
            }
            AuditLogStorage::Redis(log) => {
                log.map_tx_hash_to_sender(tx_hash, sender_address).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logs_are_appended_in_order() {
        let log = InMemoryAuditLog::new();
        log.log_attempt(&AuditEntry::new("0x1", "0xs", None))
            .await
            .unwrap();
        log.log_attempt(&AuditEntry::new("0x2", "0xs", None))
            .await
            .unwrap();
        log.log_failure(&AuditEntry::new("0x2", "0xs", None))
            .await
            .unwrap();

        let attempts = log.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].request_hash, "0x1");
        assert_eq!(attempts[1].request_hash, "0x2");
        assert_eq!(log.failures().len(), 1);
        assert!(log.successes().is_empty());
    }

    #[tokio::test]
    async fn tx_hash_maps_to_sender() {
        let log = InMemoryAuditLog::new();
        log.map_tx_hash_to_sender("0xhash", "0xsender").await.unwrap();
        assert_eq!(log.sender_for("0xhash"), Some("0xsender".to_string()));
        assert_eq!(log.sender_for("0xother"), None);
    }
}
