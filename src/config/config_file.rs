//! JSON configuration file: per-chain RPC endpoints, wallet pools and gas
//! policy, validated at load time.

use std::{collections::HashSet, fmt, fs};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    constants::{
        DEFAULT_FALLBACK_GAS_PRICE, DEFAULT_GAS_LIMIT, DEFAULT_GAS_TIER_MULTIPLIER,
        DEFAULT_HIGH_GAS_PRICE, DEFAULT_MIN_GAS_PRICE, GAS_PRICE_CACHE_TTL_SECS,
    },
    models::GasTier,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Duplicate chain id: {0}")]
    DuplicateId(String),
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),
    #[error("Invalid private key for wallet {0}")]
    InvalidPrivateKey(String),
    #[error("Invalid gas policy for chain {chain}: {reason}")]
    InvalidGasPolicy { chain: String, reason: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One address/key pair. Debug redacts the key so the struct can be traced.
#[derive(Clone, Deserialize)]
pub struct WalletEntry {
    pub address: String,
    pub private_key: String,
}

impl fmt::Debug for WalletEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletEntry")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GasPolicyConfig {
    /// Live per-request network query, clamped into a configured band.
    Network {
        #[serde(default = "default_min_gas_price")]
        min_gas_price: u128,
        #[serde(default = "default_high_gas_price")]
        high_gas_price: u128,
        #[serde(default = "default_fallback_gas_price")]
        fallback_gas_price: u128,
    },
    /// Tiered table from an upstream gas estimation service, cached briefly.
    Tiered {
        gas_station_url: String,
        tier: GasTier,
        #[serde(default = "default_gas_multiplier")]
        multiplier: f64,
        #[serde(default = "default_cache_ttl")]
        cache_ttl_secs: u64,
    },
}

fn default_min_gas_price() -> u128 {
    DEFAULT_MIN_GAS_PRICE
}
fn default_high_gas_price() -> u128 {
    DEFAULT_HIGH_GAS_PRICE
}
fn default_fallback_gas_price() -> u128 {
    DEFAULT_FALLBACK_GAS_PRICE
}
fn default_gas_multiplier() -> f64 {
    DEFAULT_GAS_TIER_MULTIPLIER
}
fn default_cache_ttl() -> u64 {
    GAS_PRICE_CACHE_TTL_SECS
}
fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub id: String,
    pub chain_id: u64,
    pub primary_rpc_url: String,
    pub secondary_rpc_url: String,
    pub wallets: Vec<WalletEntry>,
    pub gas: GasPolicyConfig,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Minimum relayer wallet balance in wei before the funding monitor acts.
    pub minimum_balance: u128,
    /// Funded account used for development auto-funding.
    #[serde(default)]
    pub funder: Option<WalletEntry>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::MissingField("chains".into()));
        }

        let mut seen_ids = HashSet::new();
        for chain in &self.chains {
            if !seen_ids.insert(&chain.id) {
                return Err(ConfigError::DuplicateId(chain.id.clone()));
            }
            chain.validate()?;
        }
        Ok(())
    }
}

impl ChainConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_rpc_url.is_empty() || self.secondary_rpc_url.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "rpc urls for chain {}",
                self.id
            )));
        }
        if self.wallets.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "wallets for chain {}",
                self.id
            )));
        }

        let address_re = Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex");
        let key_re = Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").expect("static regex");
        for wallet in self.wallets.iter().chain(self.funder.iter()) {
            if !address_re.is_match(&wallet.address) {
                return Err(ConfigError::InvalidAddress(wallet.address.clone()));
            }
            if !key_re.is_match(&wallet.private_key) {
                return Err(ConfigError::InvalidPrivateKey(wallet.address.clone()));
            }
        }

        if let GasPolicyConfig::Network {
            min_gas_price,
            high_gas_price,
            ..
        } = &self.gas
        {
            if min_gas_price >= high_gas_price {
                return Err(ConfigError::InvalidGasPolicy {
                    chain: self.id.clone(),
                    reason: "min_gas_price must be below high_gas_price".into(),
                });
            }
        }
        if let GasPolicyConfig::Tiered {
            gas_station_url,
            multiplier,
            ..
        } = &self.gas
        {
            if gas_station_url.is_empty() {
                return Err(ConfigError::InvalidGasPolicy {
                    chain: self.id.clone(),
                    reason: "gas_station_url is required".into(),
                });
            }
            if *multiplier <= 0.0 {
                return Err(ConfigError::InvalidGasPolicy {
                    chain: self.id.clone(),
                    reason: "multiplier must be positive".into(),
                });
            }
        }
        Ok(())
    }
}
