//! Wallet pool with per-wallet mutual exclusion.
//!
//! Two concurrent relays must never hold the same wallet: the on-chain nonce
//! is read "pending" at submission time, and two transactions signed
//! back-to-back with the same observed nonce conflict on-chain. The lock is
//! keyed by wallet address and lives either in-process or in Redis so that
//! multiple relay processes can share one pool.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use log::warn;
use rand::Rng;
use redis::aio::ConnectionManager;
use tokio::sync::Notify;

use crate::{
    constants::{WALLET_LEASE_POLL_MS, WALLET_LOCK_KEY_PREFIX, WALLET_LOCK_TTL_MS},
    models::{RelayerError, RelayerWallet, RepositoryError},
};

#[cfg(test)]
use mockall::automock;

/// Mutual exclusion per wallet address within a named pool.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WalletLockTrait: Send + Sync {
    /// Returns true when the lock was taken; false when already held.
    async fn try_acquire(&self, pool_id: &str, address: &str) -> Result<bool, RepositoryError>;

    /// Idempotent; releasing an unheld lock is a no-op.
    async fn release(&self, pool_id: &str, address: &str) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryWalletLock {
    held: DashMap<String, ()>,
}

impl InMemoryWalletLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(pool_id: &str, address: &str) -> String {
        format!("{pool_id}:{address}")
    }
}

#[async_trait]
impl WalletLockTrait for InMemoryWalletLock {
    async fn try_acquire(&self, pool_id: &str, address: &str) -> Result<bool, RepositoryError> {
        match self.held.entry(Self::key(pool_id, address)) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(true)
            }
        }
    }

    async fn release(&self, pool_id: &str, address: &str) -> Result<(), RepositoryError> {
        self.held.remove(&Self::key(pool_id, address));
        Ok(())
    }
}

/// Redis `SET NX PX` lock. The TTL bounds how long a crashed process can keep
/// a wallet out of circulation.
pub struct RedisWalletLock {
    conn: ConnectionManager,
    ttl_ms: u64,
}

impl RedisWalletLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl_ms: WALLET_LOCK_TTL_MS,
        }
    }

    fn key(pool_id: &str, address: &str) -> String {
        format!("{WALLET_LOCK_KEY_PREFIX}:{pool_id}:{address}")
    }
}

#[async_trait]
impl WalletLockTrait for RedisWalletLock {
    async fn try_acquire(&self, pool_id: &str, address: &str) -> Result<bool, RepositoryError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::key(pool_id, address))
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn release(&self, pool_id: &str, address: &str) -> Result<(), RepositoryError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(Self::key(pool_id, address))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(e.to_string()))?;
        Ok(())
    }
}

pub enum WalletLockStorage {
    InMemory(InMemoryWalletLock),
    Redis(RedisWalletLock),
}

#[async_trait]
impl WalletLockTrait for WalletLockStorage {
    async fn try_acquire(&self, pool_id: &str, address: &str) -> Result<bool, RepositoryError> {
        match self {
            WalletLockStorage::InMemory(lock) => lock.try_acquire(pool_id, address).await,
            WalletLockStorage::Redis(lock) => lock.try_acquire(pool_id, address).await,
        }
    }

    async fn release(&self, pool_id: &str, address: &str) -> Result<(), RepositoryError> {
        match self {
            WalletLockStorage::InMemory(lock) => lock.release(pool_id, address).await,
            WalletLockStorage::Redis(lock) => lock.release(pool_id, address).await,
        }
    }
}

/// Fixed set of relayer wallets for one chain.
pub struct WalletPool {
    pool_id: String,
    wallets: Vec<Arc<RelayerWallet>>,
    locks: Arc<dyn WalletLockTrait>,
    /// Fairness heuristic: skip the previously leased wallet on the first
    /// selection pass when more than one is free.
    last_leased: parking_lot::Mutex<Option<String>>,
    freed: Notify,
    poll_interval: Duration,
}

impl std::fmt::Debug for WalletPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletPool")
            .field("pool_id", &self.pool_id)
            .finish_non_exhaustive()
    }
}

impl WalletPool {
    /// A pool needs at least one wallet; `lease` on an empty pool could never
    /// complete.
    pub fn new(
        pool_id: &str,
        wallets: Vec<RelayerWallet>,
        locks: Arc<dyn WalletLockTrait>,
    ) -> Result<Self, RelayerError> {
        if wallets.is_empty() {
            return Err(RelayerError::Configuration(format!(
                "wallet pool {pool_id} has no wallets"
            )));
        }
        Ok(Self {
            pool_id: pool_id.to_string(),
            wallets: wallets.into_iter().map(Arc::new).collect(),
            locks,
            last_leased: parking_lot::Mutex::new(None),
            freed: Notify::new(),
            poll_interval: Duration::from_millis(WALLET_LEASE_POLL_MS),
        })
    }

    pub fn size(&self) -> usize {
        self.wallets.len()
    }

    pub fn wallets(&self) -> &[Arc<RelayerWallet>] {
        &self.wallets
    }

    /// Leases a free wallet, waiting as long as it takes for one to be
    /// released. Exhaustion never errors; the caller's own timeout policy
    /// bounds the wait. Lock backend failures are logged and retried.
    pub async fn lease(&self) -> Arc<RelayerWallet> {
        loop {
            if let Some(wallet) = self.try_lease_once().await {
                return wallet;
            }
            // A released wallet wakes us immediately; the poll interval
            // covers releases from other processes holding the shared lock.
            tokio::select! {
                _ = self.freed.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One randomized pass over the pool: circular iteration from a random
    /// offset, deferring the previously leased wallet to the end.
    async fn try_lease_once(&self) -> Option<Arc<RelayerWallet>> {
        let count = self.wallets.len();
        let avoid = self.last_leased.lock().clone();
        let offset = rand::rng().random_range(0..count);

        let mut deferred: Option<&Arc<RelayerWallet>> = None;
        for i in 0..count {
            let wallet = &self.wallets[(offset + i) % count];
            if avoid.as_deref() == Some(wallet.address.as_str()) {
                deferred = Some(wallet);
                continue;
            }
            if self.acquire(&wallet.address).await {
                return self.mark_leased(wallet);
            }
        }
        if let Some(wallet) = deferred {
            if self.acquire(&wallet.address).await {
                return self.mark_leased(wallet);
            }
        }
        None
    }

    async fn acquire(&self, address: &str) -> bool {
        match self.locks.try_acquire(&self.pool_id, address).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("wallet lock acquire failed for {address}, reselecting: {e}");
                false
            }
        }
    }

    fn mark_leased(&self, wallet: &Arc<RelayerWallet>) -> Option<Arc<RelayerWallet>> {
        *self.last_leased.lock() = Some(wallet.address.clone());
        Some(wallet.clone())
    }

    /// Always safe to call, including after a failed relay; runs on every
    /// exit path out of a lease.
    pub async fn release(&self, wallet: &RelayerWallet) {
        if let Err(e) = self.locks.release(&self.pool_id, &wallet.address).await {
            warn!("wallet lock release failed for {}: {e}", wallet.address);
        }
        self.freed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEYS: [&str; 3] = [
        "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        "6370fd033278c143179d81c5526140625662b8daa446c22ee2d73db3707e620c",
        "646f1ce2fdad0e6deeeb5c7e8e5543bdde65e86029e2fd9fc169899c440a7913",
    ];
    const ADDRS: [&str; 3] = [
        "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23",
        "0xf0109fc8df283027b6285cc889f5aa624eac1f55",
        "0x5c3f6b9dca5ae4f8e8d6a0b5c4a0e4cf3a6b2d18",
    ];

    fn pool(n: usize) -> WalletPool {
        let wallets = (0..n)
            .map(|i| RelayerWallet::new(ADDRS[i], KEYS[i], 99).unwrap())
            .collect();
        WalletPool::new("test", wallets, Arc::new(InMemoryWalletLock::new())).unwrap()
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = WalletPool::new("test", Vec::new(), Arc::new(InMemoryWalletLock::new()))
            .unwrap_err();
        assert!(matches!(err, RelayerError::Configuration(_)));
    }

    #[tokio::test]
    async fn lease_and_release_round_trip() {
        let pool = pool(1);
        let wallet = pool.lease().await;
        assert_eq!(wallet.address, ADDRS[0]);
        pool.release(&wallet).await;

        // Released wallet is immediately leasable again.
        let again = pool.lease().await;
        assert_eq!(again.address, ADDRS[0]);
        pool.release(&again).await;
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let pool = pool(1);
        let wallet = pool.lease().await;
        pool.release(&wallet).await;
        pool.release(&wallet).await;
        let again = pool.lease().await;
        pool.release(&again).await;
    }

    #[tokio::test]
    async fn sequential_leases_avoid_repeats() {
        let pool = pool(2);
        for _ in 0..10 {
            let first = pool.lease().await;
            pool.release(&first).await;
            let second = pool.lease().await;
            assert_ne!(first.address, second.address);
            pool.release(&second).await;
        }
    }

    #[tokio::test]
    async fn exhausted_pool_blocks_until_release() {
        let pool = Arc::new(pool(2));
        let a = pool.lease().await;
        let b = pool.lease().await;
        assert_ne!(a.address, b.address);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                let wallet = pool.lease().await;
                wallet.address.clone()
            })
        };

        // The third lease cannot complete while both wallets are held.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        pool.release(&a).await;
        let leased = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("lease should complete after release")
            .unwrap();
        assert_eq!(leased, a.address);
        pool.release(&b).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_of_one_serializes_all_holders() {
        let pool = Arc::new(pool(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let wallet = pool.lease().await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                pool.release(&wallet).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lock_storage_in_memory_semantics() {
        let lock = WalletLockStorage::InMemory(InMemoryWalletLock::new());
        assert!(lock.try_acquire("p", "0xa").await.unwrap());
        assert!(!lock.try_acquire("p", "0xa").await.unwrap());
        // Same address under a different pool id is independent.
        assert!(lock.try_acquire("q", "0xa").await.unwrap());
        lock.release("p", "0xa").await.unwrap();
        assert!(lock.try_acquire("p", "0xa").await.unwrap());
    }
}
