//! End-to-end relay flow against a programmable fake chain.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy::primitives::U256;
use async_trait::async_trait;
use parking_lot::Mutex;

use evm_tx_relay::{
    config::{Environment, GasPolicyConfig},
    domain::{InMemoryWalletLock, RelayOrchestrator, WalletPool},
    models::{
        ProviderError, RelayRequest, RelayerError, RelayerWallet, TransactionReceipt,
    },
    repositories::{InMemoryAuditLog, InMemoryTransactionRepository},
    services::{EvmProviderTrait, GasPriceOracle, InMemoryGasPriceCache},
};

const KEYS: [&str; 2] = [
    "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
    "6370fd033278c143179d81c5526140625662b8daa446c22ee2d73db3707e620c",
];
const ADDRS: [&str; 2] = [
    "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23",
    "0xf0109fc8df283027b6285cc889f5aa624eac1f55",
];

/// Fake chain endpoint. Counts submissions, tracks per-address nonces and can
/// be switched into a permanently failing mode.
struct FakeChain {
    label: &'static str,
    failing: AtomicBool,
    submits: AtomicUsize,
    nonces: Mutex<HashMap<String, u64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    submit_delay_ms: AtomicU64,
}

impl FakeChain {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            failing: AtomicBool::new(false),
            submits: AtomicUsize::new(0),
            nonces: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            submit_delay_ms: AtomicU64::new(5),
        }
    }

    fn failing(label: &'static str) -> Self {
        let chain = Self::new(label);
        chain.failing.store(true, Ordering::SeqCst);
        chain
    }

    fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvmProviderTrait for FakeChain {
    async fn get_gas_price(&self) -> Result<u128, ProviderError> {
        Ok(15_000_000_000)
    }

    async fn get_transaction_count(&self, address: &str) -> Result<u64, ProviderError> {
        Ok(*self.nonces.lock().entry(address.to_string()).or_insert(0))
    }

    async fn get_balance(&self, _address: &str) -> Result<U256, ProviderError> {
        Ok(U256::from(1_000_000_000_000_000_000u128))
    }

    async fn send_raw_transaction(
        &self,
        _raw: &[u8],
    ) -> Result<TransactionReceipt, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Rpc(format!("{} endpoint down", self.label)));
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionReceipt {
            transaction_hash: format!("0x{}{:04x}", self.label, n),
            block_number: Some(format!("0x{:x}", n + 1)),
            block_hash: None,
            status: Some("0x1".to_string()),
            from: None,
            to: None,
            gas_used: None,
        })
    }
}

struct Stack {
    orchestrator: RelayOrchestrator<FakeChain>,
    primary: Arc<FakeChain>,
    secondary: Arc<FakeChain>,
    pool: Arc<WalletPool>,
    audit: Arc<InMemoryAuditLog>,
}

fn stack(wallet_count: usize, primary: FakeChain, secondary: FakeChain) -> Stack {
    let wallets = (0..wallet_count)
        .map(|i| RelayerWallet::new(ADDRS[i], KEYS[i], 99).unwrap())
        .collect();
    let pool = Arc::new(
        WalletPool::new("l2", wallets, Arc::new(InMemoryWalletLock::new())).unwrap(),
    );
    let primary = Arc::new(primary);
    let secondary = Arc::new(secondary);
    let oracle = Arc::new(GasPriceOracle::from_config(
        &GasPolicyConfig::Network {
            min_gas_price: 10_000_000_000,
            high_gas_price: 25_000_000_000,
            fallback_gas_price: 39_062_500_000,
        },
        primary.clone(),
        Arc::new(InMemoryGasPriceCache::new()),
        Environment::Production,
    ));
    let audit = Arc::new(InMemoryAuditLog::new());

    let orchestrator = RelayOrchestrator::new(
        "l2",
        99,
        1_011_968,
        pool.clone(),
        oracle,
        primary.clone(),
        secondary.clone(),
        Arc::new(InMemoryTransactionRepository::new()),
        audit.clone(),
    );
    Stack {
        orchestrator,
        primary,
        secondary,
        pool,
        audit,
    }
}

fn request(payload: &str) -> RelayRequest {
    RelayRequest {
        contract_registry_key: "EntityManager".to_string(),
        contract_address: "0x0000000000000000000000000000000000000010".to_string(),
        encoded_payload: payload.to_string(),
        sender_address: "0x0000000000000000000000000000000000000099".to_string(),
        gas_limit: None,
    }
}

#[tokio::test]
async fn relaying_the_same_payload_twice_submits_once() {
    let s = stack(1, FakeChain::new("p"), FakeChain::new("s"));

    let first = s.orchestrator.relay(request("0xabc123")).await.unwrap();
    let second = s.orchestrator.relay(request("0xabc123")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(s.primary.submit_count(), 1);
    assert_eq!(s.secondary.submit_count(), 0);
}

#[tokio::test]
async fn failover_succeeds_with_secondary_receipt() {
    let s = stack(1, FakeChain::failing("p"), FakeChain::new("s"));

    let receipt = s.orchestrator.relay(request("0xabc123")).await.unwrap();
    assert!(receipt.transaction_hash.starts_with("0xs"));
    assert_eq!(s.secondary.submit_count(), 1);
    assert_eq!(s.audit.successes().len(), 1);
}

#[tokio::test]
async fn double_failure_surfaces_submission_error_and_frees_wallet() {
    let s = stack(1, FakeChain::failing("p"), FakeChain::failing("s"));

    let err = s.orchestrator.relay(request("0xabc123")).await.unwrap_err();
    assert!(matches!(err, RelayerError::Submission { .. }));
    assert_eq!(s.audit.failures().len(), 1);

    // A fresh payload relays fine once the endpoints recover, proving the
    // wallet was not leaked by the failed attempt.
    s.primary.failing.store(false, Ordering::SeqCst);
    let receipt = tokio::time::timeout(
        Duration::from_secs(2),
        s.orchestrator.relay(request("0xdef456")),
    )
    .await
    .expect("wallet should be free")
    .unwrap();
    assert!(receipt.transaction_hash.starts_with("0xp"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_relay_still_releases_wallet_and_audits() {
    let primary = FakeChain::new("p");
    primary.submit_delay_ms.store(200, Ordering::SeqCst);
    let s = stack(1, primary, FakeChain::new("s"));

    // The caller stops waiting long before the submission completes.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        s.orchestrator.relay(request("0xabc123")),
    )
    .await;
    assert!(abandoned.is_err());

    // The in-flight relay still runs to completion and frees the wallet.
    let wallet = tokio::time::timeout(Duration::from_secs(5), s.pool.lease())
        .await
        .expect("wallet should come back after the abandoned relay finishes");
    s.pool.release(&wallet).await;

    assert_eq!(s.primary.submit_count(), 1);
    assert_eq!(s.audit.successes().len(), 1);

    // And the receipt was persisted, so a retry of the same payload is served
    // from the store instead of being submitted again.
    let replay = s.orchestrator.relay(request("0xabc123")).await.unwrap();
    assert!(replay.transaction_hash.starts_with("0xp"));
    assert_eq!(s.primary.submit_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_relays_on_one_wallet_serialize() {
    let s = Arc::new(stack(1, FakeChain::new("p"), FakeChain::new("s")));

    let mut tasks = Vec::new();
    for i in 0..6 {
        let s = s.clone();
        tasks.push(tokio::spawn(async move {
            s.orchestrator
                .relay(request(&format!("0xabcd{i:02x}")))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(s.primary.submit_count(), 6);
    assert_eq!(s.primary.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(s.audit.attempts().len(), 6);
    assert_eq!(s.audit.successes().len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_wallets_relay_concurrently() {
    let s = Arc::new(stack(2, FakeChain::new("p"), FakeChain::new("s")));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let s = s.clone();
        tasks.push(tokio::spawn(async move {
            s.orchestrator
                .relay(request(&format!("0xbcde{i:02x}")))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(s.primary.submit_count(), 8);
    // With two wallets the pool may overlap submissions, but never beyond
    // the pool size.
    assert!(s.primary.max_in_flight.load(Ordering::SeqCst) <= 2);

    // Pool is fully free afterwards.
    let a = s.pool.lease().await;
    let b = s.pool.lease().await;
    assert_ne!(a.address, b.address);
    s.pool.release(&a).await;
    s.pool.release(&b).await;
}
