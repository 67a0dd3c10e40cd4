//! Bridge Orchestrator
//!
//! Drives a CCTP transfer burn → attest → mint, persisting the record after
//! every transition so progress survives a restart. One orchestrator serves
//! many concurrent transfers; each request_id has a single writer.
//!
//! The orchestrator never retries a burn or a mint. Each hash is persisted as
//! soon as the transaction is broadcast, before its receipt is awaited, so a
//! failure or restart after that point still knows which transaction to
//! reconcile. A failure after the burn landed is recorded with
//! `funds_burned = true` and keeps the message bytes for reconciliation or
//! `resume`.

pub mod locks;
pub mod state;

use alloy::primitives::Address;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use locks::{RecordGuard, RecordLocks};
pub use state::{BridgeState, BridgeTransfer, FailureKind, FailureReason, TransferIntent};

use crate::amount::{TokenAmount, USDC_DECIMALS};
use crate::attestation::AttestationPoller;
use crate::cancel::CancelToken;
use crate::config::AttestationConfig;
use crate::db::TransferStore;
use crate::error::BridgeError;
use crate::gate::EnvironmentGate;
use crate::ledger::{credential_address, parse_account, LedgerClient, LedgerFactory, TxId};
use crate::metrics;
use crate::redact::SigningCredential;
use crate::registry::Network;
use crate::status::{StatusReport, StatusTracker, TransferStatus};

/// Caller input for a bridge transfer, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub source_network: String,
    pub destination_network: String,
    /// Decimal USDC amount, e.g. "10" or "2.5"
    pub amount: String,
    /// Defaults to the signing credential's own address
    pub recipient: Option<String>,
    pub simulate: bool,
}

/// Store writes are retried this many times before the drive gives up
const SAVE_ATTEMPTS: u32 = 3;

const SAVE_BACKOFF: Duration = Duration::from_millis(200);

/// Attestation wait policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    pub attestation_timeout: Duration,
    pub poll_interval: Duration,
}

impl BridgeSettings {
    pub fn from_config(config: &AttestationConfig) -> Self {
        Self {
            attestation_timeout: Duration::from_secs(config.timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }
}

/// A validated bridge that was not executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulatedBridge {
    pub source_network: String,
    pub destination_network: String,
    pub amount: TokenAmount,
    /// `None` when no recipient was given and no credential is configured
    pub recipient_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BridgeOutcome {
    /// Validated only; no ledger client was built and nothing was persisted
    Simulated {
        request_id: String,
        plan: SimulatedBridge,
    },
    /// Driven to a terminal state (`minted` or `failed`)
    Executed(BridgeTransfer),
}

pub struct BridgeOrchestrator {
    gate: EnvironmentGate,
    ledgers: Arc<dyn LedgerFactory>,
    poller: AttestationPoller,
    store: Option<Arc<dyn TransferStore>>,
    credential: Option<SigningCredential>,
    settings: BridgeSettings,
    locks: RecordLocks,
}

impl BridgeOrchestrator {
    pub fn new(
        gate: EnvironmentGate,
        ledgers: Arc<dyn LedgerFactory>,
        poller: AttestationPoller,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            gate,
            ledgers,
            poller,
            store: None,
            credential: None,
            settings,
            locks: RecordLocks::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TransferStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_credential(mut self, credential: Option<SigningCredential>) -> Self {
        self.credential = credential;
        self
    }

    pub fn gate(&self) -> &EnvironmentGate {
        &self.gate
    }

    pub fn poller(&self) -> &AttestationPoller {
        &self.poller
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&Arc<dyn TransferStore>, BridgeError> {
        self.store.as_ref().ok_or_else(|| {
            BridgeError::Configuration("DATABASE_URL is required to track bridge transfers".to_string())
        })
    }

    fn credential(&self) -> Result<&SigningCredential, BridgeError> {
        self.credential.as_ref().ok_or_else(|| {
            BridgeError::Configuration("EVM_PRIVKEY_TEST is required for live transfers".to_string())
        })
    }

    /// Gate both networks and parse the amount
    fn validate_route(
        &self,
        request: &BridgeRequest,
    ) -> Result<(Network, Network, TokenAmount), BridgeError> {
        let source = self.gate.authorize(&request.source_network)?;
        let destination = self.gate.authorize(&request.destination_network)?;

        if source.identifier == destination.identifier {
            return Err(BridgeError::InvalidInput(format!(
                "source and destination are both {}",
                source.identifier
            )));
        }

        let amount = TokenAmount::parse(&request.amount, USDC_DECIMALS)?;
        Ok((source, destination, amount))
    }

    /// The explicit recipient, else the credential's own address
    fn resolve_recipient(&self, recipient: Option<&str>) -> Result<Option<Address>, BridgeError> {
        match (recipient, &self.credential) {
            (Some(recipient), _) => parse_account(recipient).map(Some),
            (None, Some(credential)) => credential_address(credential).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Gate both networks and resolve the request into an immutable intent
    pub fn validate(
        &self,
        request: &BridgeRequest,
    ) -> Result<(Network, Network, TransferIntent), BridgeError> {
        let (source, destination, amount) = self.validate_route(request)?;

        let recipient_address = self
            .resolve_recipient(request.recipient.as_deref())?
            .ok_or_else(|| {
                BridgeError::InvalidInput(
                    "recipient is required when no signing credential is configured".to_string(),
                )
            })?;

        let intent = TransferIntent {
            source_network: source.identifier.clone(),
            destination_network: destination.identifier.clone(),
            amount,
            recipient_address,
            simulate: request.simulate,
        };

        Ok((source, destination, intent))
    }

    /// Validate and, unless simulating, drive a new transfer to a terminal state.
    ///
    /// Chain-side failures are recorded on the returned transfer (state
    /// `failed`); `Err` is reserved for validation, configuration and storage
    /// errors. A simulation needs neither a credential nor a store.
    pub async fn bridge(
        &self,
        request: BridgeRequest,
        cancel: &CancelToken,
    ) -> Result<BridgeOutcome, BridgeError> {
        if request.simulate {
            let (source, destination, amount) = self.validate_route(&request)?;
            let recipient_address = self.resolve_recipient(request.recipient.as_deref())?;
            if recipient_address.is_none() {
                debug!("Simulating without a recipient; no signing credential configured");
            }

            let request_id = format!("sim-{}", Uuid::new_v4());
            info!(
                request_id = %request_id,
                from = %source.identifier,
                to = %destination.identifier,
                amount = %amount,
                "Simulated bridge transfer"
            );
            return Ok(BridgeOutcome::Simulated {
                request_id,
                plan: SimulatedBridge {
                    source_network: source.identifier,
                    destination_network: destination.identifier,
                    amount,
                    recipient_address,
                },
            });
        }

        let (source, destination, intent) = self.validate(&request)?;
        let store = self.store()?;
        let credential = self.credential()?;
        let source_ledger = self.ledgers.connect(&source)?;
        let destination_ledger = self.ledgers.connect(&destination)?;

        let request_id = Uuid::new_v4().to_string();
        let _guard = self.locks.acquire(&request_id)?;

        let transfer = BridgeTransfer::initiate(request_id, intent);
        store.save(&transfer).await?;
        metrics::record_transition("new", BridgeState::Initiated.as_str());
        info!(
            request_id = %transfer.request_id,
            from = %transfer.intent.source_network,
            to = %transfer.intent.destination_network,
            amount = %transfer.intent.amount,
            recipient = %transfer.intent.recipient_address,
            "Bridge transfer initiated"
        );

        let transfer = self
            .drive(
                transfer,
                source_ledger.as_ref(),
                destination_ledger.as_ref(),
                credential,
                store.as_ref(),
                cancel,
            )
            .await?;

        Ok(BridgeOutcome::Executed(transfer))
    }

    /// Continue a persisted transfer after a restart.
    ///
    /// A broadcast burn or mint whose hash was recorded is confirmed, never
    /// sent again. `burned` and `attestation_pending` records re-poll. An
    /// `initiated` record without a burn hash, or an `attested` record without
    /// a mint hash, may have broadcast a transaction that was never recorded,
    /// so it is failed as `interrupted` for reconciliation.
    pub async fn resume(
        &self,
        request_id: &str,
        cancel: &CancelToken,
    ) -> Result<BridgeTransfer, BridgeError> {
        let store = self.store()?;
        let _guard = self.locks.acquire(request_id)?;

        let mut transfer = store
            .get(request_id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(request_id.to_string()))?;

        if transfer.state.is_terminal() {
            return Ok(transfer);
        }

        let unrecorded = match transfer.state {
            BridgeState::Initiated if transfer.burn_tx_id.is_none() => {
                Some("stopped before the burn outcome was recorded; burn not resubmitted")
            }
            BridgeState::Attested if transfer.mint_tx_id.is_none() => Some(
                "stopped before the mint outcome was recorded; mint not resubmitted, \
                 message and attestation kept for redemption",
            ),
            _ => None,
        };
        if let Some(message) = unrecorded {
            self.fail(store.as_ref(), &mut transfer, FailureKind::Interrupted, message)
                .await?;
            return Ok(transfer);
        }

        let credential = self.credential()?;
        let source = self.gate.authorize(&transfer.intent.source_network)?;
        let destination = self.gate.authorize(&transfer.intent.destination_network)?;
        let source_ledger = self.ledgers.connect(&source)?;
        let destination_ledger = self.ledgers.connect(&destination)?;

        info!(request_id = %request_id, state = %transfer.state, "Resuming bridge transfer");

        self.drive(
            transfer,
            source_ledger.as_ref(),
            destination_ledger.as_ref(),
            credential,
            store.as_ref(),
            cancel,
        )
        .await
    }

    /// Resume every non-terminal record. Records driven elsewhere are skipped.
    pub async fn resume_all(&self, cancel: &CancelToken) -> Result<Vec<BridgeTransfer>, BridgeError> {
        let open = self
            .store()?
            .list_in_states(&BridgeState::NON_TERMINAL)
            .await?;

        let mut resumed = Vec::with_capacity(open.len());
        for transfer in open {
            match self.resume(&transfer.request_id, cancel).await {
                Ok(t) => resumed.push(t),
                Err(BridgeError::TransferInProgress(id)) => {
                    warn!(request_id = %id, "Transfer already being driven, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resumed)
    }

    /// Snapshot of the persisted record
    pub async fn get_status(&self, request_id: &str) -> Result<BridgeTransfer, BridgeError> {
        self.store()?
            .get(request_id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(request_id.to_string()))
    }

    /// Confirmation status of the mint leg on the destination network
    pub async fn mint_status(&self, request_id: &str) -> Result<StatusReport, BridgeError> {
        let transfer = self.get_status(request_id).await?;

        let Some(mint_tx_id) = transfer.mint_tx_id.as_ref() else {
            let status = if transfer.state == BridgeState::Failed {
                TransferStatus::Failed
            } else {
                TransferStatus::Pending
            };
            return Ok(StatusReport {
                status,
                confirmations: None,
            });
        };

        let destination = self.gate.authorize(&transfer.intent.destination_network)?;
        let ledger = self.ledgers.connect(&destination)?;
        let receipt = ledger.get_receipt(mint_tx_id).await?;

        Ok(StatusReport {
            status: StatusTracker::new(destination.required_confirmations).classify(receipt.as_ref()),
            confirmations: receipt.map(|r| r.confirmations),
        })
    }

    async fn drive(
        &self,
        mut transfer: BridgeTransfer,
        source: &dyn LedgerClient,
        destination: &dyn LedgerClient,
        credential: &SigningCredential,
        store: &dyn TransferStore,
        cancel: &CancelToken,
    ) -> Result<BridgeTransfer, BridgeError> {
        metrics::ACTIVE_TRANSFERS.inc();
        let result = self
            .drive_inner(&mut transfer, source, destination, credential, store, cancel)
            .await;
        metrics::ACTIVE_TRANSFERS.dec();
        result.map(|_| transfer)
    }

    async fn drive_inner(
        &self,
        transfer: &mut BridgeTransfer,
        source: &dyn LedgerClient,
        destination: &dyn LedgerClient,
        credential: &SigningCredential,
        store: &dyn TransferStore,
        cancel: &CancelToken,
    ) -> Result<(), BridgeError> {
        loop {
            match transfer.state {
                BridgeState::Initiated => {
                    let tx_id = match transfer.burn_tx_id.clone() {
                        Some(tx_id) => tx_id,
                        None => {
                            let sent = source
                                .submit_burn(
                                    transfer.intent.amount,
                                    destination.network(),
                                    transfer.intent.recipient_address,
                                    credential,
                                )
                                .await;
                            match sent {
                                Ok(tx_id) => {
                                    transfer.record_burn_submitted(tx_id.clone())?;
                                    self.record_submission(store, transfer, "burn", &tx_id)
                                        .await?;
                                    tx_id
                                }
                                Err(e) => {
                                    let kind = FailureKind::from_burn_error(&e);
                                    self.fail(store, transfer, kind, e.to_string()).await?;
                                    continue;
                                }
                            }
                        }
                    };
                    match source.confirm_burn(&tx_id).await {
                        Ok(receipt) => {
                            let from = transfer.record_burn(receipt)?;
                            self.commit(store, transfer, from).await?;
                        }
                        Err(e) => {
                            let kind = FailureKind::from_burn_error(&e);
                            self.fail(store, transfer, kind, e.to_string()).await?;
                        }
                    }
                }
                BridgeState::Burned => {
                    let from = transfer.begin_attestation()?;
                    self.commit(store, transfer, from).await?;
                }
                BridgeState::AttestationPending => {
                    let message_hash = transfer.message_hash.clone().ok_or_else(|| {
                        BridgeError::Storage(format!(
                            "transfer {} has no message hash",
                            transfer.request_id
                        ))
                    })?;
                    let polled = self
                        .poller
                        .poll(
                            &message_hash,
                            self.settings.attestation_timeout,
                            self.settings.poll_interval,
                            cancel,
                        )
                        .await;
                    match polled {
                        Ok(attestation) => {
                            let from = transfer.record_attestation(attestation)?;
                            self.commit(store, transfer, from).await?;
                        }
                        Err(e) => {
                            let kind = FailureKind::from_poll_error(&e);
                            self.fail(store, transfer, kind, e.to_string()).await?;
                        }
                    }
                }
                BridgeState::Attested => {
                    let tx_id = match transfer.mint_tx_id.clone() {
                        Some(tx_id) => tx_id,
                        None => {
                            let (attestation, message) =
                                match (transfer.attestation.clone(), transfer.message_bytes.clone()) {
                                    (Some(a), Some(m)) => (a, m),
                                    _ => {
                                        return Err(BridgeError::Storage(format!(
                                            "transfer {} is attested without attestation or message",
                                            transfer.request_id
                                        )))
                                    }
                                };
                            match destination.submit_mint(&attestation, &message, credential).await {
                                Ok(tx_id) => {
                                    transfer.record_mint_submitted(tx_id.clone())?;
                                    self.record_submission(store, transfer, "mint", &tx_id)
                                        .await?;
                                    tx_id
                                }
                                Err(e) => {
                                    let kind = FailureKind::from_mint_error(&e);
                                    self.fail(store, transfer, kind, e.to_string()).await?;
                                    continue;
                                }
                            }
                        }
                    };
                    match destination.confirm_mint(&tx_id).await {
                        Ok(()) => {
                            let from = transfer.record_mint(tx_id)?;
                            self.commit(store, transfer, from).await?;
                        }
                        Err(e) => {
                            let kind = FailureKind::from_mint_error(&e);
                            self.fail(store, transfer, kind, e.to_string()).await?;
                        }
                    }
                }
                BridgeState::Minted | BridgeState::Failed => return Ok(()),
            }
        }
    }

    /// Persist a broadcast hash before its receipt is awaited
    async fn record_submission(
        &self,
        store: &dyn TransferStore,
        transfer: &BridgeTransfer,
        leg: &str,
        tx_id: &TxId,
    ) -> Result<(), BridgeError> {
        self.save(store, transfer).await?;
        info!(
            request_id = %transfer.request_id,
            state = %transfer.state,
            leg,
            tx = %tx_id,
            "Bridge transaction broadcast"
        );
        Ok(())
    }

    /// Persist a transition that has already been applied to `transfer`
    async fn commit(
        &self,
        store: &dyn TransferStore,
        transfer: &BridgeTransfer,
        from: BridgeState,
    ) -> Result<(), BridgeError> {
        self.save(store, transfer).await?;
        metrics::record_transition(from.as_str(), transfer.state.as_str());
        info!(
            request_id = %transfer.request_id,
            from = %from,
            to = %transfer.state,
            burn_tx = ?transfer.burn_tx_id.as_ref().map(|t| t.as_str()),
            mint_tx = ?transfer.mint_tx_id.as_ref().map(|t| t.as_str()),
            "Bridge transfer state transition"
        );
        Ok(())
    }

    /// Save with exponential backoff. When every attempt fails the chain-side
    /// facts of the record are logged and carried in the returned error.
    async fn save(&self, store: &dyn TransferStore, transfer: &BridgeTransfer) -> Result<(), BridgeError> {
        let mut attempt = 0;
        loop {
            match store.save(transfer).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 < SAVE_ATTEMPTS => {
                    let backoff = SAVE_BACKOFF * 2u32.pow(attempt);
                    warn!(
                        request_id = %transfer.request_id,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Failed to persist bridge transfer, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    let burn_tx = transfer.burn_tx_id.as_ref().map(|t| t.as_str()).unwrap_or("none");
                    let mint_tx = transfer.mint_tx_id.as_ref().map(|t| t.as_str()).unwrap_or("none");
                    error!(
                        request_id = %transfer.request_id,
                        state = %transfer.state,
                        burn_tx,
                        message_hash = ?transfer.message_hash.as_ref().map(|h| h.as_str()),
                        mint_tx,
                        error = %e,
                        "Bridge transfer could not be persisted; reconcile from these hashes"
                    );
                    return Err(BridgeError::Storage(format!(
                        "transfer {} not persisted in state {} (burn tx {burn_tx}, mint tx {mint_tx}): {e}",
                        transfer.request_id, transfer.state
                    )));
                }
            }
        }
    }

    async fn fail(
        &self,
        store: &dyn TransferStore,
        transfer: &mut BridgeTransfer,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<(), BridgeError> {
        let from = transfer.fail(kind, message)?;
        if let Some(failure) = &transfer.failure {
            metrics::record_failure(failure.kind.as_str(), failure.funds_burned);
            warn!(
                request_id = %transfer.request_id,
                kind = %failure.kind,
                funds_burned = failure.funds_burned,
                reason = %failure.message,
                "Bridge transfer failed"
            );
        }
        self.commit(store, transfer, from).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::Attestation;
    use crate::db::MemoryTransferStore;
    use crate::testing::{
        orchestrator_with, sample_burn_receipt, sample_intent, test_credential, FakeLedgerFactory,
        ScriptedAttestationApi,
    };

    fn request(simulate: bool) -> BridgeRequest {
        BridgeRequest {
            source_network: "base-sepolia".to_string(),
            destination_network: "arbitrum-sepolia".to_string(),
            amount: "10".to_string(),
            recipient: None,
            simulate,
        }
    }

    #[tokio::test]
    async fn test_rejects_same_network_and_bad_amounts() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator =
            orchestrator_with(factory.clone(), Arc::new(ScriptedAttestationApi::complete_after(1)), store);

        let mut same = request(false);
        same.destination_network = "base-sepolia".to_string();
        assert!(matches!(
            orchestrator.bridge(same, &CancelToken::never()).await,
            Err(BridgeError::InvalidInput(_))
        ));

        let mut zero = request(false);
        zero.amount = "0".to_string();
        assert!(matches!(
            orchestrator.bridge(zero, &CancelToken::never()).await,
            Err(BridgeError::InvalidInput(_))
        ));

        let mut bad_recipient = request(true);
        bad_recipient.recipient = Some("not-an-address".to_string());
        assert!(orchestrator
            .bridge(bad_recipient, &CancelToken::never())
            .await
            .is_err());

        assert_eq!(factory.connections(), 0);
    }

    #[tokio::test]
    async fn test_recipient_defaults_to_credential_address() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let orchestrator = orchestrator_with(
            factory,
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            Arc::new(MemoryTransferStore::new()),
        );
        let (_, _, intent) = orchestrator.validate(&request(true)).unwrap();
        assert_eq!(
            intent.recipient_address,
            credential_address(&test_credential()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_burn_failure_is_recorded_without_retry() {
        let factory = Arc::new(FakeLedgerFactory::new());
        factory.fail_burns_with(BridgeError::Reverted {
            chain: "base-sepolia".to_string(),
            message: "execution reverted".to_string(),
        });
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            store.clone(),
        );

        let outcome = orchestrator
            .bridge(request(false), &CancelToken::never())
            .await
            .unwrap();
        let BridgeOutcome::Executed(transfer) = outcome else {
            panic!("expected executed transfer");
        };

        assert_eq!(transfer.state, BridgeState::Failed);
        let failure = transfer.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::BurnFailed);
        assert!(!failure.funds_burned);
        assert_eq!(factory.ledger("base-sepolia").burns(), 1);
        assert_eq!(store.get(&transfer.request_id).await.unwrap().unwrap(), transfer);
    }

    #[tokio::test]
    async fn test_mint_rejection_is_partial_failure() {
        let factory = Arc::new(FakeLedgerFactory::new());
        factory.fail_mints_with(BridgeError::AttestationRejected("nonce already used".to_string()));
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            Arc::new(MemoryTransferStore::new()),
        );

        let BridgeOutcome::Executed(transfer) = orchestrator
            .bridge(request(false), &CancelToken::never())
            .await
            .unwrap()
        else {
            panic!("expected executed transfer");
        };

        assert_eq!(transfer.state, BridgeState::Failed);
        let failure = transfer.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::AttestationRejected);
        assert!(failure.funds_burned);
        assert!(transfer.attestation.is_some());
        assert!(transfer.mint_tx_id.is_none());
        assert_eq!(factory.ledger("arbitrum-sepolia").mints(), 1);
    }

    #[tokio::test]
    async fn test_live_bridge_requires_credential() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            Arc::new(MemoryTransferStore::new()),
        )
        .with_credential(None);

        let mut with_recipient = request(false);
        with_recipient.recipient = Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string());
        assert!(matches!(
            orchestrator.bridge(with_recipient, &CancelToken::never()).await,
            Err(BridgeError::Configuration(_))
        ));
        assert_eq!(factory.connections(), 0);
    }

    #[tokio::test]
    async fn test_resume_initiated_is_interrupted_not_reburned() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            store.clone(),
        );

        let stuck = BridgeTransfer::initiate("req-stuck", sample_intent());
        store.save(&stuck).await.unwrap();

        let transfer = orchestrator
            .resume("req-stuck", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(transfer.state, BridgeState::Failed);
        let failure = transfer.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Interrupted);
        // the burn may have been broadcast before its hash was saved
        assert!(failure.funds_burned);
        assert_eq!(factory.ledger("base-sepolia").burns(), 0);
    }

    fn attested_record(request_id: &str) -> BridgeTransfer {
        let mut transfer = BridgeTransfer::initiate(request_id, sample_intent());
        transfer.record_burn(sample_burn_receipt()).unwrap();
        transfer.begin_attestation().unwrap();
        transfer
            .record_attestation(Attestation {
                message_hash: sample_burn_receipt().message_hash,
                signature_bytes: vec![0xab; 65],
                issued_at: chrono::Utc::now(),
            })
            .unwrap();
        transfer
    }

    #[tokio::test]
    async fn test_resume_attested_is_interrupted_not_reminted() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            store.clone(),
        );
        store.save(&attested_record("req-attested")).await.unwrap();

        let transfer = orchestrator
            .resume("req-attested", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(transfer.state, BridgeState::Failed);
        let failure = transfer.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Interrupted);
        assert!(failure.funds_burned);
        assert!(transfer.attestation.is_some());
        assert!(transfer.message_bytes.is_some());
        assert_eq!(factory.ledger("arbitrum-sepolia").mints(), 0);
        assert_eq!(factory.connections(), 0);
    }

    #[tokio::test]
    async fn test_resume_confirms_recorded_mint() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            store.clone(),
        );

        let mut record = attested_record("req-mint-sent");
        let destination = factory.ledger("arbitrum-sepolia");
        let mint_tx = destination
            .submit_mint(
                record.attestation.as_ref().unwrap(),
                record.message_bytes.as_ref().unwrap(),
                &test_credential(),
            )
            .await
            .unwrap();
        record.record_mint_submitted(mint_tx.clone()).unwrap();
        store.save(&record).await.unwrap();

        let transfer = orchestrator
            .resume("req-mint-sent", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(transfer.state, BridgeState::Minted);
        assert_eq!(transfer.mint_tx_id, Some(mint_tx));
        assert!(transfer.is_consistent());
        assert_eq!(destination.mints(), 1);
    }

    #[tokio::test]
    async fn test_resume_confirms_recorded_burn() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            store.clone(),
        );

        let intent = sample_intent();
        let source = factory.ledger("base-sepolia");
        let destination = factory.ledger("arbitrum-sepolia");
        let burn_tx = source
            .submit_burn(
                intent.amount,
                destination.network(),
                intent.recipient_address,
                &test_credential(),
            )
            .await
            .unwrap();
        let mut record = BridgeTransfer::initiate("req-burn-sent", intent);
        record.record_burn_submitted(burn_tx.clone()).unwrap();
        store.save(&record).await.unwrap();

        let transfer = orchestrator
            .resume("req-burn-sent", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(transfer.state, BridgeState::Minted);
        assert_eq!(transfer.burn_tx_id, Some(burn_tx));
        assert_eq!(source.burns(), 1);
        assert_eq!(destination.mints(), 1);
    }

    #[tokio::test]
    async fn test_resume_burned_record_completes() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(2)),
            store.clone(),
        );

        let mut burned = BridgeTransfer::initiate("req-burned", sample_intent());
        burned.record_burn(sample_burn_receipt()).unwrap();
        store.save(&burned).await.unwrap();

        let resumed = orchestrator.resume_all(&CancelToken::never()).await.unwrap();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].state, BridgeState::Minted);
        assert!(resumed[0].is_consistent());
        assert_eq!(factory.ledger("base-sepolia").burns(), 0);
        assert_eq!(factory.ledger("arbitrum-sepolia").mints(), 1);
    }

    #[tokio::test]
    async fn test_second_driver_is_refused() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let store = Arc::new(MemoryTransferStore::new());
        let orchestrator = orchestrator_with(
            factory,
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            store.clone(),
        );

        let mut burned = BridgeTransfer::initiate("req-busy", sample_intent());
        burned.record_burn(sample_burn_receipt()).unwrap();
        store.save(&burned).await.unwrap();

        let _held = orchestrator.locks.acquire("req-busy").unwrap();
        assert!(matches!(
            orchestrator.resume("req-busy", &CancelToken::never()).await,
            Err(BridgeError::TransferInProgress(_))
        ));
    }

    #[tokio::test]
    async fn test_get_status_unknown_request() {
        let orchestrator = orchestrator_with(
            Arc::new(FakeLedgerFactory::new()),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            Arc::new(MemoryTransferStore::new()),
        );
        assert!(matches!(
            orchestrator.get_status("nope").await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mint_status_tracks_destination_receipt() {
        let factory = Arc::new(FakeLedgerFactory::new());
        let orchestrator = orchestrator_with(
            factory.clone(),
            Arc::new(ScriptedAttestationApi::complete_after(1)),
            Arc::new(MemoryTransferStore::new()),
        );

        let BridgeOutcome::Executed(transfer) = orchestrator
            .bridge(request(false), &CancelToken::never())
            .await
            .unwrap()
        else {
            panic!("expected executed transfer");
        };

        // fake ledgers report freshly submitted transactions with one confirmation
        let report = orchestrator.mint_status(&transfer.request_id).await.unwrap();
        assert_eq!(report.status, TransferStatus::Confirmed);
        assert_eq!(report.confirmations, Some(1));
    }
}
