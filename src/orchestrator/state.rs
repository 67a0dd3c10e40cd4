//! Bridge transfer record and its state machine
//!
//! ```text
//! initiated ──burn──▶ burned ──▶ attestation_pending ──▶ attested ──mint──▶ minted
//!     │                 │                │                   │
//!     └─────────────────┴───────────────▶ failed ◀───────────┘
//! ```
//!
//! The record is only mutated through the transition methods below, which
//! refuse any edge not in the table. Fields are filled in the same order the
//! states advance, so a `minted` record always carries its attestation and
//! burn transaction.
//!
//! A burn or mint hash is recorded as soon as the transaction is broadcast,
//! before the state advances: an `initiated` record may carry `burn_tx_id`
//! and an `attested` record may carry `mint_tx_id`.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::amount::TokenAmount;
use crate::attestation::Attestation;
use crate::error::BridgeError;
use crate::ledger::{BurnReceipt, MessageHash, TxId};

/// Lifecycle of a cross-chain transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Initiated,
    Burned,
    AttestationPending,
    Attested,
    Minted,
    Failed,
}

impl BridgeState {
    pub const NON_TERMINAL: [BridgeState; 4] = [
        BridgeState::Initiated,
        BridgeState::Burned,
        BridgeState::AttestationPending,
        BridgeState::Attested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Initiated => "initiated",
            BridgeState::Burned => "burned",
            BridgeState::AttestationPending => "attestation_pending",
            BridgeState::Attested => "attested",
            BridgeState::Minted => "minted",
            BridgeState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BridgeState::Minted | BridgeState::Failed)
    }

    /// Edges of the transition table
    pub fn can_transition_to(&self, next: BridgeState) -> bool {
        use BridgeState::*;
        match (self, next) {
            (Initiated, Burned) => true,
            (Burned, AttestationPending) => true,
            (AttestationPending, Attested) => true,
            (Attested, Minted) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a transfer ended in `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BurnFailed,
    InsufficientFunds,
    NetworkUnavailable,
    AttestationTimeout,
    AttestationRejected,
    Cancelled,
    /// Process stopped while a burn or mint outcome was unknown
    Interrupted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BurnFailed => "burn_failed",
            FailureKind::InsufficientFunds => "insufficient_funds",
            FailureKind::NetworkUnavailable => "network_unavailable",
            FailureKind::AttestationTimeout => "attestation_timeout",
            FailureKind::AttestationRejected => "attestation_rejected",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Interrupted => "interrupted",
        }
    }

    /// Classify an error raised while burning on the source network
    pub fn from_burn_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::InsufficientFunds { .. } => FailureKind::InsufficientFunds,
            BridgeError::NetworkUnavailable { .. } => FailureKind::NetworkUnavailable,
            _ => FailureKind::BurnFailed,
        }
    }

    /// Classify an error raised while waiting for the attestation
    pub fn from_poll_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::Cancelled(_) => FailureKind::Cancelled,
            BridgeError::NetworkUnavailable { .. } => FailureKind::NetworkUnavailable,
            _ => FailureKind::AttestationTimeout,
        }
    }

    /// Classify an error raised while minting on the destination network
    pub fn from_mint_error(err: &BridgeError) -> Self {
        match err {
            BridgeError::InsufficientFunds { .. } => FailureKind::InsufficientFunds,
            BridgeError::NetworkUnavailable { .. } => FailureKind::NetworkUnavailable,
            _ => FailureKind::AttestationRejected,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "burn_failed" => FailureKind::BurnFailed,
            "insufficient_funds" => FailureKind::InsufficientFunds,
            "network_unavailable" => FailureKind::NetworkUnavailable,
            "attestation_timeout" => FailureKind::AttestationTimeout,
            "attestation_rejected" => FailureKind::AttestationRejected,
            "cancelled" => FailureKind::Cancelled,
            "interrupted" => FailureKind::Interrupted,
            other => {
                return Err(BridgeError::Storage(format!(
                    "unknown failure kind: {other}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
    /// The burn landed or may have landed; funds must be reconciled before
    /// the transfer is retried
    pub funds_burned: bool,
}

/// What the caller asked for. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferIntent {
    pub source_network: String,
    pub destination_network: String,
    pub amount: TokenAmount,
    pub recipient_address: Address,
    pub simulate: bool,
}

/// One cross-chain transfer, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeTransfer {
    pub request_id: String,
    pub intent: TransferIntent,
    pub state: BridgeState,
    pub burn_tx_id: Option<TxId>,
    pub message_hash: Option<MessageHash>,
    #[serde(serialize_with = "serialize_opt_hex")]
    pub message_bytes: Option<Vec<u8>>,
    pub attestation: Option<Attestation>,
    pub mint_tx_id: Option<TxId>,
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn serialize_opt_hex<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match bytes {
        Some(b) => serializer.serialize_str(&format!("0x{}", hex::encode(b))),
        None => serializer.serialize_none(),
    }
}

impl BridgeTransfer {
    pub fn initiate(request_id: impl Into<String>, intent: TransferIntent) -> Self {
        let now = Utc::now();
        Self {
            request_id: request_id.into(),
            intent,
            state: BridgeState::Initiated,
            burn_tx_id: None,
            message_hash: None,
            message_bytes: None,
            attestation: None,
            mint_tx_id: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn advance(&mut self, next: BridgeState) -> Result<BridgeState, BridgeError> {
        if !self.state.can_transition_to(next) {
            return Err(BridgeError::InvalidTransition {
                request_id: self.request_id.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        let from = self.state;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(from)
    }

    /// Record a broadcast burn whose receipt is not known yet. State stays `initiated`.
    pub fn record_burn_submitted(&mut self, tx_id: TxId) -> Result<(), BridgeError> {
        if self.state != BridgeState::Initiated || self.burn_tx_id.is_some() {
            return Err(self.already_submitted("burn"));
        }
        self.burn_tx_id = Some(tx_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// initiated → burned
    pub fn record_burn(&mut self, receipt: BurnReceipt) -> Result<BridgeState, BridgeError> {
        self.check_tx("burn", self.burn_tx_id.as_ref(), &receipt.tx_id)?;
        let from = self.advance(BridgeState::Burned)?;
        self.burn_tx_id = Some(receipt.tx_id);
        self.message_hash = Some(receipt.message_hash);
        self.message_bytes = Some(receipt.message);
        Ok(from)
    }

    /// burned → attestation_pending
    pub fn begin_attestation(&mut self) -> Result<BridgeState, BridgeError> {
        self.advance(BridgeState::AttestationPending)
    }

    /// attestation_pending → attested. The attestation must cover this transfer's message.
    pub fn record_attestation(
        &mut self,
        attestation: Attestation,
    ) -> Result<BridgeState, BridgeError> {
        if self.message_hash.as_ref() != Some(&attestation.message_hash) {
            return Err(BridgeError::InvalidInput(format!(
                "attestation for {} does not match transfer {}",
                attestation.message_hash, self.request_id
            )));
        }
        let from = self.advance(BridgeState::Attested)?;
        self.attestation = Some(attestation);
        Ok(from)
    }

    /// Record a broadcast mint whose receipt is not known yet. State stays `attested`.
    pub fn record_mint_submitted(&mut self, tx_id: TxId) -> Result<(), BridgeError> {
        if self.state != BridgeState::Attested || self.mint_tx_id.is_some() {
            return Err(self.already_submitted("mint"));
        }
        self.mint_tx_id = Some(tx_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// attested → minted
    pub fn record_mint(&mut self, tx_id: TxId) -> Result<BridgeState, BridgeError> {
        self.check_tx("mint", self.mint_tx_id.as_ref(), &tx_id)?;
        let from = self.advance(BridgeState::Minted)?;
        self.mint_tx_id = Some(tx_id);
        Ok(from)
    }

    /// Any non-terminal state → failed. Everything recorded so far is kept.
    ///
    /// Funds count as burned once a burn was broadcast, unless its receipt
    /// showed a revert, and always when an `initiated` record was interrupted
    /// since the burn may have gone out without its hash being recorded.
    pub fn fail(
        &mut self,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<BridgeState, BridgeError> {
        let from = self.advance(BridgeState::Failed)?;
        let funds_burned = match (from, kind) {
            (BridgeState::Initiated, FailureKind::Interrupted) => true,
            (BridgeState::Initiated, FailureKind::BurnFailed | FailureKind::InsufficientFunds) => {
                false
            }
            _ => self.burn_tx_id.is_some(),
        };
        self.failure = Some(FailureReason {
            kind,
            message: message.into(),
            funds_burned,
        });
        Ok(from)
    }

    fn already_submitted(&self, leg: &str) -> BridgeError {
        BridgeError::InvalidTransition {
            request_id: self.request_id.clone(),
            from: self.state.to_string(),
            to: format!("{leg}_submitted"),
        }
    }

    fn check_tx(&self, leg: &str, recorded: Option<&TxId>, got: &TxId) -> Result<(), BridgeError> {
        match recorded {
            Some(recorded) if recorded != got => Err(BridgeError::InvalidInput(format!(
                "{leg} receipt {got} does not match recorded transaction {recorded} for {}",
                self.request_id
            ))),
            _ => Ok(()),
        }
    }

    /// Field/state consistency. Holds for every record a transition produced.
    pub fn is_consistent(&self) -> bool {
        let burned = self.burn_tx_id.is_some()
            && self.message_hash.is_some()
            && self.message_bytes.is_some();

        let fields_ok = match self.state {
            BridgeState::Initiated => !burned && self.attestation.is_none(),
            BridgeState::Burned | BridgeState::AttestationPending => {
                burned && self.attestation.is_none()
            }
            BridgeState::Attested => burned && self.attestation.is_some(),
            BridgeState::Minted => {
                burned && self.attestation.is_some() && self.mint_tx_id.is_some()
            }
            BridgeState::Failed => self.failure.is_some(),
        };

        // a mint can only have been sent for an attested burn
        let mint_ok = self.mint_tx_id.is_none() || (self.attestation.is_some() && burned);

        fields_ok && mint_ok
    }
}
