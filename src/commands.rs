//! Command surface
//!
//! One typed request/response pair per agent command. Every command passes the
//! Environment Gate before any ledger client is built; simulated writes never
//! build one at all.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::amount::{TokenAmount, USDC_DECIMALS};
use crate::attestation::FetchOutcome;
use crate::cancel::CancelToken;
use crate::error::BridgeError;
use crate::gate::EnvironmentGate;
use crate::hash::is_bytes32_hex;
use crate::ledger::{credential_address, parse_account, LedgerFactory, MessageHash};
use crate::metrics;
use crate::orchestrator::{
    BridgeOrchestrator, BridgeOutcome, BridgeRequest, BridgeState, BridgeTransfer, FailureReason,
};
use crate::paylink::{Paylink, PaylinkIssuer};
use crate::redact::SigningCredential;
use crate::status::{StatusTracker, TransferStatus};

const TOKEN_SYMBOL: &str = "USDC";

// ============================================================================
// Requests / responses
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRequest {
    pub account: String,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceResponse {
    pub balance: String,
    pub token: String,
    pub chain: String,
    pub account: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub to: String,
    pub amount: String,
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    pub simulated: bool,
    pub chain: String,
    pub to: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeResponse {
    pub request_id: String,
    pub simulated: bool,
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<BridgeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burn_txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl From<BridgeOutcome> for BridgeResponse {
    fn from(outcome: BridgeOutcome) -> Self {
        match outcome {
            BridgeOutcome::Simulated { request_id, plan } => Self {
                request_id,
                simulated: true,
                from: plan.source_network,
                to: plan.destination_network,
                amount: plan.amount.to_string(),
                recipient: plan.recipient_address.map(|a| a.to_string()),
                state: None,
                burn_txid: None,
                message_hash: None,
                mint_txid: None,
                failure: None,
            },
            BridgeOutcome::Executed(transfer) => Self::from(transfer),
        }
    }
}

impl From<BridgeTransfer> for BridgeResponse {
    fn from(transfer: BridgeTransfer) -> Self {
        Self {
            request_id: transfer.request_id,
            simulated: false,
            from: transfer.intent.source_network,
            to: transfer.intent.destination_network,
            amount: transfer.intent.amount.to_string(),
            recipient: Some(transfer.intent.recipient_address.to_string()),
            state: Some(transfer.state),
            burn_txid: transfer.burn_tx_id.map(|t| t.to_string()),
            message_hash: transfer.message_hash.map(|h| h.to_string()),
            mint_txid: transfer.mint_tx_id.map(|t| t.to_string()),
            failure: transfer.failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttestationStatusResponse {
    pub status: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentStatusRequest {
    pub txid: String,
    #[serde(default)]
    pub chain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatusResponse {
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    pub txid: String,
    pub chain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaylinkResponse {
    pub paylink: Paylink,
}

// ============================================================================
// Agent
// ============================================================================

/// Entry point for every command
pub struct Agent {
    gate: EnvironmentGate,
    ledgers: Arc<dyn LedgerFactory>,
    orchestrator: Arc<BridgeOrchestrator>,
    paylinks: PaylinkIssuer,
    credential: Option<SigningCredential>,
    default_chain: String,
}

impl Agent {
    pub fn new(
        gate: EnvironmentGate,
        ledgers: Arc<dyn LedgerFactory>,
        orchestrator: Arc<BridgeOrchestrator>,
        paylinks: PaylinkIssuer,
        credential: Option<SigningCredential>,
        default_chain: impl Into<String>,
    ) -> Self {
        Self {
            gate,
            ledgers,
            orchestrator,
            paylinks,
            credential,
            default_chain: default_chain.into(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<BridgeOrchestrator> {
        &self.orchestrator
    }

    fn chain_or_default<'a>(&'a self, chain: Option<&'a str>) -> &'a str {
        chain.unwrap_or(&self.default_chain)
    }

    fn credential(&self) -> Result<&SigningCredential, BridgeError> {
        self.credential.as_ref().ok_or_else(|| {
            BridgeError::Configuration("EVM_PRIVKEY_TEST is required for live transfers".to_string())
        })
    }

    /// `usdc_balance`
    pub async fn balance(&self, request: BalanceRequest) -> Result<BalanceResponse, BridgeError> {
        timed("balance", async {
            let network = self.gate.authorize(self.chain_or_default(request.chain.as_deref()))?;
            let account = parse_account(&request.account)?;

            let ledger = self.ledgers.connect(&network)?;
            let balance = ledger.get_balance(account).await?;

            Ok(BalanceResponse {
                balance: balance.to_string(),
                token: TOKEN_SYMBOL.to_string(),
                chain: network.identifier,
                account: request.account,
            })
        })
        .await
    }

    /// `usdc_transfer_testnet`
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResponse, BridgeError> {
        timed("transfer", async {
            let network = self.gate.authorize(self.chain_or_default(request.chain.as_deref()))?;
            let to = parse_account(&request.to)?;
            let amount = TokenAmount::parse(&request.amount, USDC_DECIMALS)?;

            if request.simulate {
                info!(chain = %network.identifier, to = %to, amount = %amount, "Simulated transfer");
                return Ok(TransferResponse {
                    txid: None,
                    simulated: true,
                    chain: network.identifier,
                    to: request.to,
                    amount: amount.to_string(),
                    from: None,
                });
            }

            let credential = self.credential()?;
            let from = credential_address(credential)?;
            let ledger = self.ledgers.connect(&network)?;

            // the ledger client checks the balance before it signs
            let tx_id = ledger.submit_transfer(to, amount, credential).await?;
            info!(
                chain = %network.identifier,
                from = %from,
                to = %to,
                amount = %amount,
                txid = %tx_id,
                "Transfer submitted"
            );

            Ok(TransferResponse {
                txid: Some(tx_id.to_string()),
                simulated: false,
                chain: network.identifier,
                to: request.to,
                amount: amount.to_string(),
                from: Some(from.to_string()),
            })
        })
        .await
    }

    /// `usdc_cctp_bridge_testnet`
    pub async fn bridge(
        &self,
        request: BridgeRequest,
        cancel: &CancelToken,
    ) -> Result<BridgeResponse, BridgeError> {
        timed("bridge", async {
            let outcome = self.orchestrator.bridge(request, cancel).await?;
            Ok(BridgeResponse::from(outcome))
        })
        .await
    }

    /// `resume`: continue one persisted transfer
    pub async fn resume(
        &self,
        request_id: &str,
        cancel: &CancelToken,
    ) -> Result<BridgeResponse, BridgeError> {
        timed("resume", async {
            let transfer = self.orchestrator.resume(request_id, cancel).await?;
            Ok(BridgeResponse::from(transfer))
        })
        .await
    }

    /// `resume` without an id: continue every open transfer
    pub async fn resume_all(&self, cancel: &CancelToken) -> Result<Vec<BridgeResponse>, BridgeError> {
        timed("resume", async {
            let transfers = self.orchestrator.resume_all(cancel).await?;
            Ok(transfers.into_iter().map(BridgeResponse::from).collect())
        })
        .await
    }

    /// `usdc_cctp_attestation_status`
    ///
    /// Answers from the transfer store. An id the store does not know is
    /// treated as a raw message hash and looked up at the attestation service.
    pub async fn attestation_status(
        &self,
        request_id: &str,
    ) -> Result<AttestationStatusResponse, BridgeError> {
        timed("attestation_status", async {
            self.gate.ensure_test_mode()?;

            if self.orchestrator.has_store() {
                match self.orchestrator.get_status(request_id).await {
                    Ok(transfer) => return Ok(stored_attestation_status(&transfer)),
                    Err(BridgeError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }

            let candidate = if request_id.starts_with("0x") {
                request_id.to_string()
            } else {
                format!("0x{request_id}")
            };
            if !is_bytes32_hex(&candidate) {
                return Err(BridgeError::NotFound(request_id.to_string()));
            }
            let message_hash = MessageHash::parse(&candidate)?;

            let outcome = match self.orchestrator.poller().api().fetch(&message_hash).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(message_hash = %message_hash, error = %e, "Attestation lookup failed");
                    FetchOutcome::NotFound
                }
            };

            let attestation = match &outcome {
                FetchOutcome::Complete(a) => Some(a.signature_hex()),
                _ => None,
            };
            Ok(AttestationStatusResponse {
                status: outcome.status().to_string(),
                request_id: message_hash.to_string(),
                attestation,
            })
        })
        .await
    }

    /// `usdc_payment_status`
    pub async fn payment_status(
        &self,
        request: PaymentStatusRequest,
    ) -> Result<PaymentStatusResponse, BridgeError> {
        timed("payment_status", async {
            let network = self.gate.authorize(self.chain_or_default(request.chain.as_deref()))?;
            let ledger = self.ledgers.connect(&network)?;

            let report = StatusTracker::new(network.required_confirmations)
                .check(ledger.as_ref(), &request.txid)
                .await?;

            Ok(PaymentStatusResponse {
                status: report.status,
                confirmations: report.confirmations,
                txid: request.txid,
                chain: network.identifier,
            })
        })
        .await
    }

    /// `usdc_paylink_create`
    pub async fn paylink_create(
        &self,
        amount: &str,
        memo: Option<&str>,
    ) -> Result<PaylinkResponse, BridgeError> {
        timed("paylink_create", async {
            self.gate.ensure_test_mode()?;
            let paylink = self.paylinks.create(amount, memo)?;
            Ok(PaylinkResponse { paylink })
        })
        .await
    }
}

fn stored_attestation_status(transfer: &BridgeTransfer) -> AttestationStatusResponse {
    let status = match transfer.state {
        BridgeState::Attested | BridgeState::Minted => "complete",
        BridgeState::Failed if transfer.attestation.is_some() => "complete",
        BridgeState::Failed => "failed",
        BridgeState::Initiated | BridgeState::Burned | BridgeState::AttestationPending => {
            "pending"
        }
    };

    AttestationStatusResponse {
        status: status.to_string(),
        request_id: transfer.request_id.clone(),
        attestation: transfer.attestation.as_ref().map(|a| a.signature_hex()),
    }
}

async fn timed<T, F>(command: &str, fut: F) -> Result<T, BridgeError>
where
    F: std::future::Future<Output = Result<T, BridgeError>>,
{
    let started = Instant::now();
    let result = fut.await;
    metrics::record_command(command, result.is_ok(), started.elapsed().as_secs_f64());
    result
}
