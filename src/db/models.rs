use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;

use crate::amount::TokenAmount;
use crate::attestation::Attestation;
use crate::error::BridgeError;
use crate::ledger::{MessageHash, TxId};
use crate::orchestrator::state::{
    BridgeState, BridgeTransfer, FailureKind, FailureReason, TransferIntent,
};

// Amounts are stored as NUMERIC(78,0) base units. They are bound as text and
// cast in SQL ($n::NUMERIC), and selected back as amount::TEXT.

/// Row of `bridge_transfers`
#[derive(Debug, Clone, FromRow)]
pub struct BridgeTransferRow {
    pub request_id: String,
    pub source_network: String,
    pub destination_network: String,
    pub amount: String,
    pub decimals: i16,
    pub recipient: String,
    pub state: BridgeState,
    pub burn_tx_id: Option<String>,
    pub message_hash: Option<String>,
    pub message_bytes: Option<Vec<u8>>,
    pub attestation: Option<Vec<u8>>,
    pub attestation_issued_at: Option<DateTime<Utc>>,
    pub mint_tx_id: Option<String>,
    pub failure_kind: Option<String>,
    pub failure_message: Option<String>,
    pub funds_burned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&BridgeTransfer> for BridgeTransferRow {
    fn from(t: &BridgeTransfer) -> Self {
        Self {
            request_id: t.request_id.clone(),
            source_network: t.intent.source_network.clone(),
            destination_network: t.intent.destination_network.clone(),
            amount: t.intent.amount.raw().to_string(),
            decimals: t.intent.amount.decimals() as i16,
            recipient: t.intent.recipient_address.to_string(),
            state: t.state,
            burn_tx_id: t.burn_tx_id.as_ref().map(|tx| tx.to_string()),
            message_hash: t.message_hash.as_ref().map(|h| h.to_string()),
            message_bytes: t.message_bytes.clone(),
            attestation: t.attestation.as_ref().map(|a| a.signature_bytes.clone()),
            attestation_issued_at: t.attestation.as_ref().map(|a| a.issued_at),
            mint_tx_id: t.mint_tx_id.as_ref().map(|tx| tx.to_string()),
            failure_kind: t.failure.as_ref().map(|f| f.kind.to_string()),
            failure_message: t.failure.as_ref().map(|f| f.message.clone()),
            funds_burned: t.failure.as_ref().map(|f| f.funds_burned).unwrap_or(false),
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

impl TryFrom<BridgeTransferRow> for BridgeTransfer {
    type Error = BridgeError;

    fn try_from(row: BridgeTransferRow) -> Result<Self, Self::Error> {
        let corrupt =
            |field: &str| BridgeError::Storage(format!("corrupt {field} in transfer {}", row.request_id));

        let raw = U256::from_str_radix(&row.amount, 10).map_err(|_| corrupt("amount"))?;
        let decimals = u8::try_from(row.decimals).map_err(|_| corrupt("decimals"))?;
        let recipient = Address::from_str(&row.recipient).map_err(|_| corrupt("recipient"))?;

        let burn_tx_id = row
            .burn_tx_id
            .as_deref()
            .map(TxId::parse)
            .transpose()
            .map_err(|_| corrupt("burn_tx_id"))?;
        let message_hash = row
            .message_hash
            .as_deref()
            .map(MessageHash::parse)
            .transpose()
            .map_err(|_| corrupt("message_hash"))?;
        let mint_tx_id = row
            .mint_tx_id
            .as_deref()
            .map(TxId::parse)
            .transpose()
            .map_err(|_| corrupt("mint_tx_id"))?;

        let attestation = match row.attestation {
            Some(signature_bytes) => Some(Attestation {
                message_hash: message_hash.clone().ok_or_else(|| corrupt("attestation"))?,
                signature_bytes,
                issued_at: row.attestation_issued_at.unwrap_or(row.updated_at),
            }),
            None => None,
        };

        let failure = match row.failure_kind {
            Some(kind) => Some(FailureReason {
                kind: FailureKind::from_str(&kind)?,
                message: row.failure_message.unwrap_or_default(),
                funds_burned: row.funds_burned,
            }),
            None => None,
        };

        Ok(BridgeTransfer {
            request_id: row.request_id,
            intent: TransferIntent {
                source_network: row.source_network,
                destination_network: row.destination_network,
                amount: TokenAmount::from_raw(raw, decimals),
                recipient_address: recipient,
                simulate: false,
            },
            state: row.state,
            burn_tx_id,
            message_hash,
            message_bytes: row.message_bytes,
            attestation,
            mint_tx_id,
            failure,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
