//! EVM transaction relay service.
//!
//! Accepts pre-built, ABI-encoded contract-call payloads, signs them with one
//! of a managed pool of funded relayer wallets, submits them to an EVM
//! JSON-RPC endpoint and returns the receipt. Guarantees per-wallet nonce
//! serialization, payload idempotency and primary/secondary RPC failover.

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod domain;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;
