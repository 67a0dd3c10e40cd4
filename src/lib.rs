//! USDC CCTP Agent - Library interface
//!
//! Testnet-only USDC balances, transfers and CCTP burn/attest/mint bridging.
//! Re-exports internal modules for use in integration tests.

pub mod amount;
pub mod api;
pub mod attestation;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod hash;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod paylink;
pub mod redact;
pub mod registry;
pub mod status;

// In-process fakes (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::BridgeError;
