//! Defaults and fixed keys for the relay subsystem.

/// 10 gwei. Prices read below this are clamped up; a zero price would likely
/// never be mined.
pub const DEFAULT_MIN_GAS_PRICE: u128 = 10_000_000_000;

/// 25 gwei. Readings above this are treated as anomalous.
pub const DEFAULT_HIGH_GAS_PRICE: u128 = 25_000_000_000;

/// Substituted when the network reports an unusable gas price. Local dev
/// chains report absurdly high prices, so this is hardcoded low.
pub const DEFAULT_FALLBACK_GAS_PRICE: u128 = 39_062_500_000;

/// 0xf7100
pub const DEFAULT_GAS_LIMIT: u64 = 1_011_968;

/// Gas limit for plain value transfers (wallet funding).
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Fixed per-tier price returned by the tiered oracle in development mode.
pub const DEV_TIERED_GAS_PRICE: u128 = 10_000_000_000;

/// Multiplier applied to the selected gas tier to bias toward inclusion.
pub const DEFAULT_GAS_TIER_MULTIPLIER: f64 = 1.2;

/// How long a tiered gas price snapshot stays fresh.
pub const GAS_PRICE_CACHE_TTL_SECS: u64 = 30;

pub const GAS_PRICE_CACHE_KEY: &str = "ethGasPriceSnapshot";

/// Interval between lease retries when every wallet in the pool is taken.
pub const WALLET_LEASE_POLL_MS: u64 = 200;

/// Expiry on distributed wallet locks so a crashed process cannot leak a
/// wallet forever.
pub const WALLET_LOCK_TTL_MS: u64 = 60_000;

pub const WALLET_LOCK_KEY_PREFIX: &str = "RELAYER_WALLET";

// Ordered audit logs and the tx hash lookup map.
pub const RELAY_TX_ATTEMPTS_KEY: &str = "relayTxAttempts";
pub const RELAY_TX_SUCCESSES_KEY: &str = "relayTxSuccesses";
pub const RELAY_TX_FAILURES_KEY: &str = "relayTxFailures";
pub const TX_HASH_TO_SENDER_KEY: &str = "txHashToSenderAddress";

pub const TRANSACTION_RECORDS_KEY: &str = "relayTxRecords";

/// Receipt polling after submission.
pub const RECEIPT_POLL_INTERVAL_MS: u64 = 1_000;
pub const RECEIPT_POLL_MAX_ATTEMPTS: u32 = 60;
