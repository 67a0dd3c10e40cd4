//! Error taxonomy for the agent
//!
//! Library code returns [`BridgeError`]; the binary wraps it in `eyre` at the
//! edge. Raw RPC/contract error strings are mapped into the taxonomy with
//! [`classify_error`], the same substring classification the bridge writers use
//! for retry decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors surfaced by the gate, ledger clients, attestation client and orchestrator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Fatal pre-flight error: the process refuses to run
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    /// Malformed caller input (address, amount, identical networks)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient funds on {chain}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        chain: String,
        balance: String,
        requested: String,
    },

    #[error("attestation rejected by destination contract: {0}")]
    AttestationRejected(String),

    /// The chain accepted the transaction but it reverted
    #[error("transaction reverted on {chain}: {message}")]
    Reverted { chain: String, message: String },

    #[error("network unavailable ({chain}): {message}")]
    NetworkUnavailable { chain: String, message: String },

    #[error("attestation for {message_hash} not available after {waited_secs}s: {reason}")]
    AttestationTimeout {
        message_hash: String,
        waited_secs: u64,
        reason: String,
    },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("transfer {0} is already being driven by another caller")]
    TransferInProgress(String),

    #[error("transfer not found: {0}")]
    NotFound(String),

    #[error("invalid state transition for {request_id}: {from} -> {to}")]
    InvalidTransition {
        request_id: String,
        from: String,
        to: String,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl BridgeError {
    pub fn network(chain: impl Into<String>, message: impl fmt::Display) -> Self {
        BridgeError::NetworkUnavailable {
            chain: chain.into(),
            message: message.to_string(),
        }
    }

    /// Stable machine-readable kind, used in persisted failure reasons and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Configuration(_) => "configuration",
            BridgeError::UnknownNetwork(_) => "unknown_network",
            BridgeError::InvalidInput(_) => "invalid_input",
            BridgeError::InsufficientFunds { .. } => "insufficient_funds",
            BridgeError::AttestationRejected(_) => "attestation_rejected",
            BridgeError::Reverted { .. } => "reverted",
            BridgeError::NetworkUnavailable { .. } => "network_unavailable",
            BridgeError::AttestationTimeout { .. } => "attestation_timeout",
            BridgeError::Cancelled(_) => "cancelled",
            BridgeError::TransferInProgress(_) => "transfer_in_progress",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::InvalidTransition { .. } => "invalid_transition",
            BridgeError::Storage(_) => "storage",
        }
    }
}

impl From<sqlx::Error> for BridgeError {
    fn from(e: sqlx::Error) -> Self {
        BridgeError::Storage(e.to_string())
    }
}

/// Coarse classification of raw chain/RPC error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Temporary failure (RPC timeout, connectivity, rate limiting)
    Transient,
    /// Account cannot cover the amount or the gas
    InsufficientFunds,
    /// Contract rejected the call
    Reverted,
    /// Anything else
    Unknown,
}

/// Classify a raw error message
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("insufficient funds")
        || error_lower.contains("transfer amount exceeds balance")
        || error_lower.contains("burn amount exceeds")
    {
        return ErrorClass::InsufficientFunds;
    }

    if error_lower.contains("reverted")
        || error_lower.contains("execution reverted")
        || error_lower.contains("invalid signature")
        || error_lower.contains("invalid attestation")
        || error_lower.contains("nonce already used")
    {
        return ErrorClass::Reverted;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("connection refused"), ErrorClass::Transient);
        assert_eq!(classify_error("request timed out"), ErrorClass::Transient);
        assert_eq!(classify_error("HTTP 503 from upstream"), ErrorClass::Transient);
        assert_eq!(
            classify_error("insufficient funds for gas * price + value"),
            ErrorClass::InsufficientFunds
        );
        assert_eq!(
            classify_error("execution reverted: Invalid attestation length"),
            ErrorClass::Reverted
        );
        assert_eq!(classify_error("something odd"), ErrorClass::Unknown);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(
            BridgeError::network("base-sepolia", "down").kind(),
            "network_unavailable"
        );
        assert_eq!(
            BridgeError::AttestationRejected("replay".into()).kind(),
            "attestation_rejected"
        );
    }

    #[test]
    fn test_display_includes_context() {
        let err = BridgeError::InsufficientFunds {
            chain: "base-sepolia".into(),
            balance: "1.00".into(),
            requested: "5".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("base-sepolia"));
        assert!(msg.contains("5"));
    }
}
