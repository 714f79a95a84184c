//! Gas price tiers and the cached snapshot returned by the tiered oracle.

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasTier {
    Average,
    Fast,
    Fastest,
}

/// Tiered gas prices in wei, cached with a short TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasPriceSnapshot {
    pub average: u128,
    pub fast: u128,
    pub fastest: u128,
    /// Unix seconds at fetch time. Freshness is decided by the oracle.
    pub fetched_at: i64,
    /// Set when the snapshot was answered from cache rather than fetched.
    #[serde(default)]
    pub cached: bool,
}

impl GasPriceSnapshot {
    pub fn uniform(price: u128) -> Self {
        Self {
            average: price,
            fast: price,
            fastest: price,
            fetched_at: Utc::now().timestamp(),
            cached: false,
        }
    }

    pub fn tier(&self, tier: GasTier) -> u128 {
        match tier {
            GasTier::Average => self.average,
            GasTier::Fast => self.fast,
            GasTier::Fastest => self.fastest,
        }
    }

    pub fn age_secs(&self) -> i64 {
        Utc::now().timestamp() - self.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_selection() {
        let snapshot = GasPriceSnapshot {
            average: 1,
            fast: 2,
            fastest: 3,
            fetched_at: 0,
            cached: false,
        };
        assert_eq!(snapshot.tier(GasTier::Average), 1);
        assert_eq!(snapshot.tier(GasTier::Fast), 2);
        assert_eq!(snapshot.tier(GasTier::Fastest), 3);
    }

    #[test]
    fn uniform_snapshot_is_recent() {
        let snapshot = GasPriceSnapshot::uniform(10);
        assert_eq!(snapshot.tier(GasTier::Fastest), 10);
        assert!(snapshot.age_secs() < 2);
    }

    #[test]
    fn tier_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&GasTier::Fastest).unwrap(), "\"fastest\"");
        let tier: GasTier = serde_json::from_str("\"average\"").unwrap();
        assert_eq!(tier, GasTier::Average);
    }
}
