//! Wires configuration into per-chain relay components.

use std::{sync::Arc, time::Duration};

use eyre::{eyre, Result};
use log::info;
use redis::aio::ConnectionManager;

use crate::{
    config::{ChainConfig, Config, GasPolicyConfig, ServerConfig},
    domain::{
        FundingMonitor, InMemoryWalletLock, RedisWalletLock, RelayOrchestrator, WalletLockStorage,
        WalletPool,
    },
    models::RelayerWallet,
    repositories::{
        AuditLogStorage, InMemoryAuditLog, InMemoryTransactionRepository, RedisAuditLog,
        RedisTransactionRepository, TransactionRepositoryStorage,
    },
    services::{
        EvmProvider, GasPriceCacheStorage, GasPriceOracle, GasPriceOracleTrait,
        InMemoryGasPriceCache, RedisGasPriceCache,
    },
};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Fully wired relay stack for one chain.
pub struct ChainRelay {
    pub id: String,
    pub orchestrator: Arc<RelayOrchestrator<EvmProvider>>,
    pub funding: Arc<FundingMonitor<EvmProvider>>,
}

pub async fn connect_redis(server_config: &ServerConfig) -> Result<Option<ConnectionManager>> {
    match &server_config.redis_url {
        None => Ok(None),
        Some(url) => {
            let client = redis::Client::open(url.as_str())
                .map_err(|e| eyre!("invalid redis url: {e}"))?;
            let conn = client
                .get_connection_manager()
                .await
                .map_err(|e| eyre!("failed to connect to redis: {e}"))?;
            Ok(Some(conn))
        }
    }
}

fn build_wallets(chain: &ChainConfig) -> Result<Vec<RelayerWallet>> {
    chain
        .wallets
        .iter()
        .map(|entry| {
            RelayerWallet::new(&entry.address, &entry.private_key, chain.chain_id)
                .map_err(|e| eyre!("wallet {} on chain {}: {e}", entry.address, chain.id))
        })
        .collect()
}

fn build_chain(
    chain: &ChainConfig,
    server_config: &ServerConfig,
    redis: Option<&ConnectionManager>,
) -> Result<ChainRelay> {
    let primary = Arc::new(EvmProvider::new(&chain.primary_rpc_url, RPC_TIMEOUT)?);
    let secondary = Arc::new(EvmProvider::new(&chain.secondary_rpc_url, RPC_TIMEOUT)?);

    let locks = Arc::new(match redis {
        Some(conn) => WalletLockStorage::Redis(RedisWalletLock::new(conn.clone())),
        None => WalletLockStorage::InMemory(InMemoryWalletLock::new()),
    });
    let pool = Arc::new(WalletPool::new(&chain.id, build_wallets(chain)?, locks)?);

    let cache = Arc::new(match (redis, &chain.gas) {
        (Some(conn), GasPolicyConfig::Tiered { cache_ttl_secs, .. }) => {
            GasPriceCacheStorage::Redis(RedisGasPriceCache::new(conn.clone(), *cache_ttl_secs))
        }
        _ => GasPriceCacheStorage::InMemory(InMemoryGasPriceCache::new()),
    });
    let oracle: Arc<dyn GasPriceOracleTrait> = Arc::new(GasPriceOracle::from_config(
        &chain.gas,
        primary.clone(),
        cache,
        server_config.environment,
    ));

    let transactions = Arc::new(match redis {
        Some(conn) => TransactionRepositoryStorage::Redis(RedisTransactionRepository::new(
            conn.clone(),
            &chain.id,
        )),
        None => TransactionRepositoryStorage::InMemory(InMemoryTransactionRepository::new()),
    });
    let audit = Arc::new(match redis {
        Some(conn) => AuditLogStorage::Redis(RedisAuditLog::new(conn.clone(), &chain.id)),
        None => AuditLogStorage::InMemory(InMemoryAuditLog::new()),
    });

    let orchestrator = Arc::new(RelayOrchestrator::new(
        &chain.id,
        chain.chain_id,
        chain.default_gas_limit,
        pool.clone(),
        oracle.clone(),
        primary.clone(),
        secondary,
        transactions,
        audit,
    ));

    let funder = chain
        .funder
        .as_ref()
        .map(|entry| RelayerWallet::new(&entry.address, &entry.private_key, chain.chain_id))
        .transpose()
        .map_err(|e| eyre!("funder on chain {}: {e}", chain.id))?;
    let funding = Arc::new(FundingMonitor::new(
        &chain.id,
        chain.chain_id,
        primary,
        oracle,
        pool,
        funder,
        chain.minimum_balance,
        server_config.environment,
    ));

    info!(
        "initialized chain {} with {} relayer wallets",
        chain.id,
        chain.wallets.len()
    );
    Ok(ChainRelay {
        id: chain.id.clone(),
        orchestrator,
        funding,
    })
}

/// Builds the relay stack for every configured chain.
pub async fn initialize_relays(
    config: &Config,
    server_config: &ServerConfig,
) -> Result<Vec<ChainRelay>> {
    let redis = connect_redis(server_config).await?;
    config
        .chains
        .iter()
        .map(|chain| build_chain(chain, server_config, redis.as_ref()))
        .collect()
}
