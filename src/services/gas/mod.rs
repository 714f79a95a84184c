//! Gas price oracle.
//!
//! Two policies, parametrized by chain configuration rather than duplicated
//! per chain:
//!
//! - **Network**: query the chain's current gas price per request and clamp
//!   it into `[min, high]`; zero becomes `min` (a zero-priced transaction
//!   would likely never be mined) and unusable or above-ceiling readings
//!   become a fixed fallback. Degraded readings are absorbed, never errors.
//! - **Tiered**: a tiered price table fetched from an upstream gas estimation
//!   service, cached with a short TTL and multiplied by a configured factor.
//!   Development mode returns a fixed low constant for every tier.

mod cache;

pub use cache::*;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::{Environment, GasPolicyConfig},
    constants::DEV_TIERED_GAS_PRICE,
    models::{GasPriceSnapshot, GasTier, ProviderError},
    services::provider::EvmProviderTrait,
};

#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait GasPriceOracleTrait: Send + Sync {
    /// A safe gas price in wei for the configured chain.
    async fn gas_price(&self) -> Result<u128, ProviderError>;
}

/// Upstream gas station response, prices in tenths of gwei.
#[derive(Debug, Deserialize)]
struct GasStationResponse {
    average: f64,
    fast: f64,
    fastest: f64,
}

fn tenths_of_gwei_to_wei(value: f64) -> u128 {
    (value * 1e8) as u128
}

pub struct GasStationClient {
    http: Client,
    url: String,
}

impl GasStationClient {
    pub fn new(url: &str) -> Self {
        Self {
            http: Client::new(),
            url: url.to_string(),
        }
    }

    pub async fn fetch(&self) -> Result<GasPriceSnapshot, ProviderError> {
        let response: GasStationResponse = self
            .http
            .get(&self.url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::BadResponse(e.to_string()))?;

        Ok(GasPriceSnapshot {
            average: tenths_of_gwei_to_wei(response.average),
            fast: tenths_of_gwei_to_wei(response.fast),
            fastest: tenths_of_gwei_to_wei(response.fastest),
            fetched_at: chrono::Utc::now().timestamp(),
            cached: false,
        })
    }
}

enum Policy<P: EvmProviderTrait> {
    Network {
        provider: Arc<P>,
        min: u128,
        high: u128,
        fallback: u128,
    },
    Tiered {
        station: GasStationClient,
        cache: Arc<dyn GasPriceCacheTrait>,
        tier: GasTier,
        multiplier: f64,
        ttl_secs: u64,
        environment: Environment,
    },
}

pub struct GasPriceOracle<P: EvmProviderTrait> {
    policy: Policy<P>,
}

impl<P: EvmProviderTrait> GasPriceOracle<P> {
    pub fn from_config(
        config: &GasPolicyConfig,
        provider: Arc<P>,
        cache: Arc<dyn GasPriceCacheTrait>,
        environment: Environment,
    ) -> Self {
        let policy = match config {
            GasPolicyConfig::Network {
                min_gas_price,
                high_gas_price,
                fallback_gas_price,
            } => Policy::Network {
                provider,
                min: *min_gas_price,
                high: *high_gas_price,
                fallback: *fallback_gas_price,
            },
            GasPolicyConfig::Tiered {
                gas_station_url,
                tier,
                multiplier,
                cache_ttl_secs,
            } => Policy::Tiered {
                station: GasStationClient::new(gas_station_url),
                cache,
                tier: *tier,
                multiplier: *multiplier,
                ttl_secs: *cache_ttl_secs,
                environment,
            },
        };
        Self { policy }
    }

    /// Clamp policy for live network readings.
    fn clamp(reading: Result<u128, ProviderError>, min: u128, high: u128, fallback: u128) -> u128 {
        match reading {
            Err(e) => {
                info!("gas price was not readable, using fallback: {e}");
                fallback
            }
            Ok(price) if price > high => {
                info!("gas price {price} above ceiling {high}, using fallback");
                fallback
            }
            Ok(0) => {
                info!("gas price was zero, clamping to minimum {min}");
                min
            }
            Ok(price) if price < min => {
                info!("gas price {price} below minimum, clamping to {min}");
                min
            }
            Ok(price) => price,
        }
    }

    async fn tiered_price(
        station: &GasStationClient,
        cache: &Arc<dyn GasPriceCacheTrait>,
        tier: GasTier,
        multiplier: f64,
        ttl_secs: u64,
        environment: Environment,
    ) -> Result<u128, ProviderError> {
        if environment.is_development() {
            return Ok(DEV_TIERED_GAS_PRICE);
        }

        let cached = match cache.get().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("gas price cache read failed: {e}");
                None
            }
        };

        if let Some(snapshot) = &cached {
            if snapshot.age_secs() <= ttl_secs as i64 {
                return Ok((snapshot.tier(tier) as f64 * multiplier) as u128);
            }
        }

        match station.fetch().await {
            Ok(snapshot) => {
                if let Err(e) = cache.set(&snapshot).await {
                    warn!("gas price cache write failed: {e}");
                }
                Ok((snapshot.tier(tier) as f64 * multiplier) as u128)
            }
            Err(fetch_err) => {
                // A stale snapshot beats failing the relay outright.
                if let Some(snapshot) = cached {
                    warn!(
                        "gas station fetch failed ({fetch_err}), using stale snapshot aged {}s",
                        snapshot.age_secs()
                    );
                    return Ok((snapshot.tier(tier) as f64 * multiplier) as u128);
                }
                Err(fetch_err)
            }
        }
    }
}

#[async_trait]
impl<P: EvmProviderTrait> GasPriceOracleTrait for GasPriceOracle<P> {
    async fn gas_price(&self) -> Result<u128, ProviderError> {
        match &self.policy {
            Policy::Network {
                provider,
                min,
                high,
                fallback,
            } => Ok(Self::clamp(
                provider.get_gas_price().await,
                *min,
                *high,
                *fallback,
            )),
            Policy::Tiered {
                station,
                cache,
                tier,
                multiplier,
                ttl_secs,
                environment,
            } => {
                Self::tiered_price(station, cache, *tier, *multiplier, *ttl_secs, *environment)
                    .await
            }
        }
    }
}
