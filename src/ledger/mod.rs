//! Ledger clients
//!
//! A [`LedgerClient`] is bound to exactly one [`Network`] and wraps the reads
//! and writes the agent performs against it. The orchestrator only ever sees
//! the trait; [`evm::EvmLedger`] is the alloy-backed implementation and the
//! fakes in [`crate::testing`] back the tests.

pub mod contracts;
pub mod evm;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::amount::TokenAmount;
use crate::attestation::Attestation;
use crate::error::BridgeError;
use crate::hash::{bytes32_to_hex, is_bytes32_hex};
use crate::redact::SigningCredential;
use crate::registry::Network;

pub use evm::{EvmLedger, EvmLedgerFactory};

/// Transaction hash, `0x` + 64 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Parse a transaction id, rejecting anything not shaped like a 32-byte hash
    pub fn parse(value: &str) -> Result<Self, BridgeError> {
        let value = value.trim();
        if !is_bytes32_hex(value) {
            return Err(BridgeError::InvalidInput(format!(
                "malformed transaction id: {value}"
            )));
        }
        Ok(Self(value.to_lowercase()))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(bytes32_to_hex(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// keccak256 of a CCTP message, the attestation service's lookup key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHash(String);

impl MessageHash {
    pub fn parse(value: &str) -> Result<Self, BridgeError> {
        let value = value.trim();
        if !is_bytes32_hex(value) {
            return Err(BridgeError::InvalidInput(format!(
                "malformed message hash: {value}"
            )));
        }
        Ok(Self(value.to_lowercase()))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(bytes32_to_hex(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a confirmed burn on the source network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnReceipt {
    pub tx_id: TxId,
    pub message_hash: MessageHash,
    /// Raw `MessageSent` payload, required again for redemption
    pub message: Vec<u8>,
}

/// What the node currently knows about a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Receipt {
    /// `head - block + 1`, so an included transaction has at least one
    pub confirmations: u64,
    pub succeeded: bool,
}

/// Reads and writes against one network
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn network(&self) -> &Network;

    /// Decimals of the network's USDC contract
    async fn token_decimals(&self) -> Result<u8, BridgeError>;

    async fn get_balance(&self, account: Address) -> Result<TokenAmount, BridgeError>;

    async fn submit_transfer(
        &self,
        to: Address,
        amount: TokenAmount,
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError>;

    /// Approve the TokenMessenger and broadcast a burn of `amount` for
    /// `recipient` on `destination`. Returns once the burn is broadcast.
    async fn submit_burn(
        &self,
        amount: TokenAmount,
        destination: &Network,
        recipient: Address,
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError>;

    /// Wait for a broadcast burn and extract its CCTP message.
    /// A revert is [`BridgeError::Reverted`].
    async fn confirm_burn(&self, tx_id: &TxId) -> Result<BurnReceipt, BridgeError>;

    /// Broadcast the redemption of an attested message
    async fn submit_mint(
        &self,
        attestation: &Attestation,
        message: &[u8],
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError>;

    /// Wait for a broadcast mint. A revert is [`BridgeError::AttestationRejected`].
    async fn confirm_mint(&self, tx_id: &TxId) -> Result<(), BridgeError>;

    /// `None` when the node does not know the transaction yet
    async fn get_receipt(&self, tx_id: &TxId) -> Result<Option<Receipt>, BridgeError>;
}

/// Builds ledger clients for gate-authorized networks
pub trait LedgerFactory: Send + Sync {
    fn connect(&self, network: &Network) -> Result<Arc<dyn LedgerClient>, BridgeError>;
}

/// Address controlled by the signing credential
pub fn credential_address(credential: &SigningCredential) -> Result<Address, BridgeError> {
    let signer = signer_from(credential)?;
    Ok(signer.address())
}

pub(crate) fn signer_from(credential: &SigningCredential) -> Result<PrivateKeySigner, BridgeError> {
    credential
        .expose()
        .parse::<PrivateKeySigner>()
        .map_err(|_| BridgeError::Configuration("signing credential is not a valid private key".to_string()))
}

/// Parse a caller-supplied EVM address
pub fn parse_account(value: &str) -> Result<Address, BridgeError> {
    let value = value.trim();
    if value.len() != 42 || !value.starts_with("0x") {
        return Err(BridgeError::InvalidInput(format!(
            "not an EVM address: {value}"
        )));
    }
    Address::from_str(value)
        .map_err(|_| BridgeError::InvalidInput(format!("not an EVM address: {value}")))
}
