//! In-process fakes for the ledger and attestation seams
//!
//! Used by the unit tests and, through the `testing` feature, by the
//! integration tests under `tests/`.
//! Every fake counts its calls so tests can assert that a path performed
//! no writes.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::amount::{TokenAmount, USDC_DECIMALS};
use crate::attestation::{Attestation, AttestationApi, AttestationPoller, FetchOutcome};
use crate::config::NetworkConfig;
use crate::db::TransferStore;
use crate::error::BridgeError;
use crate::gate::EnvironmentGate;
use crate::hash::keccak256;
use crate::ledger::{
    credential_address, BurnReceipt, LedgerClient, LedgerFactory, MessageHash, Receipt, TxId,
};
use crate::orchestrator::{BridgeOrchestrator, BridgeSettings, TransferIntent};
use crate::redact::SigningCredential;
use crate::registry::{known_network, ChainRegistry, Network};

/// Well-known local development key (anvil account #0)
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const TEST_ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

/// Both catalogue networks with local RPC endpoints
pub fn test_network_configs() -> Vec<NetworkConfig> {
    ["base-sepolia", "arbitrum-sepolia"]
        .iter()
        .zip(["http://localhost:8545", "http://localhost:8546"])
        .filter_map(|(id, rpc)| known_network(id).map(|k| NetworkConfig::from_known(k, Some(rpc.to_string()))))
        .collect()
}

pub fn test_registry() -> Arc<ChainRegistry> {
    match ChainRegistry::from_networks(&test_network_configs()) {
        Ok(registry) => Arc::new(registry),
        Err(e) => panic!("test registry must build: {e}"),
    }
}

pub fn test_gate() -> EnvironmentGate {
    EnvironmentGate::new(Some(true), test_registry())
}

pub fn test_credential() -> SigningCredential {
    SigningCredential::new(TEST_PRIVATE_KEY)
}

pub fn test_account() -> Address {
    Address::from_str(TEST_ACCOUNT).unwrap_or(Address::ZERO)
}

pub fn usdc(amount: &str) -> TokenAmount {
    match TokenAmount::parse(amount, USDC_DECIMALS) {
        Ok(a) => a,
        Err(e) => panic!("bad test amount {amount}: {e}"),
    }
}

pub fn sample_message_hash() -> MessageHash {
    MessageHash::from_bytes(&keccak256(b"sample cctp message"))
}

pub fn sample_burn_receipt() -> BurnReceipt {
    let message = b"sample cctp message".to_vec();
    BurnReceipt {
        tx_id: TxId::from_bytes(&keccak256(b"sample burn tx")),
        message_hash: MessageHash::from_bytes(&keccak256(&message)),
        message,
    }
}

/// 10 USDC from base-sepolia to arbitrum-sepolia
pub fn sample_intent() -> TransferIntent {
    TransferIntent {
        source_network: "base-sepolia".to_string(),
        destination_network: "arbitrum-sepolia".to_string(),
        amount: usdc("10"),
        recipient_address: test_account(),
        simulate: false,
    }
}

/// Fast attestation policy for tests
pub fn test_settings() -> BridgeSettings {
    BridgeSettings {
        attestation_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(5),
    }
}

/// Orchestrator over fakes, with the test credential
pub fn orchestrator_with(
    ledgers: Arc<FakeLedgerFactory>,
    api: Arc<ScriptedAttestationApi>,
    store: Arc<dyn TransferStore>,
) -> BridgeOrchestrator {
    BridgeOrchestrator::new(
        test_gate(),
        ledgers,
        AttestationPoller::new(api, 3),
        test_settings(),
    )
    .with_store(store)
    .with_credential(Some(test_credential()))
}

// ============================================================================
// Fake ledger
// ============================================================================

#[derive(Default)]
struct FakeLedgerState {
    balances: HashMap<Address, U256>,
    receipts: HashMap<TxId, Receipt>,
    burn_messages: HashMap<TxId, Vec<u8>>,
    burn_failure: Option<BridgeError>,
    mint_failure: Option<BridgeError>,
    burn_confirm_failure: Option<BridgeError>,
    mint_confirm_failure: Option<BridgeError>,
}

/// In-memory ledger. Every account starts with 1000 USDC unless set otherwise.
pub struct FakeLedger {
    network: Network,
    state: Mutex<FakeLedgerState>,
    default_balance: U256,
    transfers: AtomicUsize,
    burns: AtomicUsize,
    mints: AtomicUsize,
    nonce: AtomicUsize,
}

impl FakeLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            state: Mutex::new(FakeLedgerState::default()),
            default_balance: usdc("1000").raw(),
            transfers: AtomicUsize::new(0),
            burns: AtomicUsize::new(0),
            mints: AtomicUsize::new(0),
            nonce: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeLedgerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_balance(&self, account: Address, amount: TokenAmount) {
        self.state().balances.insert(account, amount.raw());
    }

    pub fn set_receipt(&self, tx_id: &TxId, receipt: Receipt) {
        self.state().receipts.insert(tx_id.clone(), receipt);
    }

    pub fn fail_burns_with(&self, err: BridgeError) {
        self.state().burn_failure = Some(err);
    }

    pub fn fail_mints_with(&self, err: BridgeError) {
        self.state().mint_failure = Some(err);
    }

    /// Burns are broadcast, then waiting for their receipt fails with `err`
    pub fn fail_burn_confirmations_with(&self, err: BridgeError) {
        self.state().burn_confirm_failure = Some(err);
    }

    /// Mints are broadcast, then waiting for their receipt fails with `err`
    pub fn fail_mint_confirmations_with(&self, err: BridgeError) {
        self.state().mint_confirm_failure = Some(err);
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn burns(&self) -> usize {
        self.burns.load(Ordering::SeqCst)
    }

    pub fn mints(&self) -> usize {
        self.mints.load(Ordering::SeqCst)
    }

    /// Total write calls of any kind. A transfer counts once it is signed.
    pub fn writes(&self) -> usize {
        self.transfers() + self.burns() + self.mints()
    }

    fn balance_of(&self, account: &Address) -> U256 {
        self.state()
            .balances
            .get(account)
            .copied()
            .unwrap_or(self.default_balance)
    }

    /// Deterministic tx id, recorded as included with one confirmation
    fn next_tx(&self, kind: &str) -> TxId {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        let seed = format!("{}:{}:{}", self.network.identifier, kind, n);
        let tx_id = TxId::from_bytes(&keccak256(seed.as_bytes()));
        self.set_receipt(
            &tx_id,
            Receipt {
                confirmations: 1,
                succeeded: true,
            },
        );
        tx_id
    }

    fn debit(&self, owner: Address, amount: &TokenAmount) -> Result<(), BridgeError> {
        let balance = self.balance_of(&owner);
        if balance < amount.raw() {
            return Err(BridgeError::InsufficientFunds {
                chain: self.network.identifier.clone(),
                balance: TokenAmount::from_raw(balance, USDC_DECIMALS).to_string(),
                requested: amount.to_string(),
            });
        }
        self.state().balances.insert(owner, balance - amount.raw());
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    fn network(&self) -> &Network {
        &self.network
    }

    async fn token_decimals(&self) -> Result<u8, BridgeError> {
        Ok(USDC_DECIMALS)
    }

    async fn get_balance(&self, account: Address) -> Result<TokenAmount, BridgeError> {
        Ok(TokenAmount::from_raw(self.balance_of(&account), USDC_DECIMALS))
    }

    async fn submit_transfer(
        &self,
        to: Address,
        amount: TokenAmount,
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError> {
        let from = credential_address(credential)?;
        self.debit(from, &amount)?;
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let credited = self.balance_of(&to) + amount.raw();
        self.state().balances.insert(to, credited);
        Ok(self.next_tx("transfer"))
    }

    async fn submit_burn(
        &self,
        amount: TokenAmount,
        destination: &Network,
        recipient: Address,
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError> {
        self.burns.fetch_add(1, Ordering::SeqCst);
        let failure = self.state().burn_failure.clone();
        if let Some(err) = failure {
            return Err(err);
        }
        let owner = credential_address(credential)?;
        self.debit(owner, &amount)?;

        let tx_id = self.next_tx("burn");
        let message = format!(
            "{}->{}:{}:{}:{}",
            self.network.cctp_domain, destination.cctp_domain, recipient, amount.raw(), tx_id
        )
        .into_bytes();
        self.state().burn_messages.insert(tx_id.clone(), message);
        Ok(tx_id)
    }

    async fn confirm_burn(&self, tx_id: &TxId) -> Result<BurnReceipt, BridgeError> {
        let (failure, message) = {
            let state = self.state();
            (state.burn_confirm_failure.clone(), state.burn_messages.get(tx_id).cloned())
        };
        if let Some(err) = failure {
            return Err(err);
        }
        let message = message.ok_or_else(|| {
            BridgeError::network(&self.network.identifier, format!("unknown burn {tx_id}"))
        })?;
        Ok(BurnReceipt {
            tx_id: tx_id.clone(),
            message_hash: MessageHash::from_bytes(&keccak256(&message)),
            message,
        })
    }

    async fn submit_mint(
        &self,
        _attestation: &Attestation,
        _message: &[u8],
        _credential: &SigningCredential,
    ) -> Result<TxId, BridgeError> {
        self.mints.fetch_add(1, Ordering::SeqCst);
        let failure = self.state().mint_failure.clone();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(self.next_tx("mint"))
    }

    async fn confirm_mint(&self, tx_id: &TxId) -> Result<(), BridgeError> {
        let (failure, known) = {
            let state = self.state();
            (state.mint_confirm_failure.clone(), state.receipts.contains_key(tx_id))
        };
        if let Some(err) = failure {
            return Err(err);
        }
        if !known {
            return Err(BridgeError::network(
                &self.network.identifier,
                format!("unknown mint {tx_id}"),
            ));
        }
        Ok(())
    }

    async fn get_receipt(&self, tx_id: &TxId) -> Result<Option<Receipt>, BridgeError> {
        Ok(self.state().receipts.get(tx_id).copied())
    }
}

/// Hands out one shared [`FakeLedger`] per registered test network
pub struct FakeLedgerFactory {
    ledgers: HashMap<String, Arc<FakeLedger>>,
    connections: AtomicUsize,
}

impl FakeLedgerFactory {
    pub fn new() -> Self {
        let ledgers = test_registry()
            .all()
            .map(|n| (n.identifier.clone(), Arc::new(FakeLedger::new(n.clone()))))
            .collect();
        Self {
            ledgers,
            connections: AtomicUsize::new(0),
        }
    }

    /// The fake behind `identifier`, without counting a connection
    pub fn ledger(&self, identifier: &str) -> Arc<FakeLedger> {
        match self.ledgers.get(identifier) {
            Some(ledger) => ledger.clone(),
            None => panic!("no fake ledger for {identifier}"),
        }
    }

    /// Number of ledger clients handed out
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn total_writes(&self) -> usize {
        self.ledgers.values().map(|l| l.writes()).sum()
    }

    pub fn fail_burns_with(&self, err: BridgeError) {
        for ledger in self.ledgers.values() {
            ledger.fail_burns_with(err.clone());
        }
    }

    pub fn fail_mints_with(&self, err: BridgeError) {
        for ledger in self.ledgers.values() {
            ledger.fail_mints_with(err.clone());
        }
    }

    pub fn fail_burn_confirmations_with(&self, err: BridgeError) {
        for ledger in self.ledgers.values() {
            ledger.fail_burn_confirmations_with(err.clone());
        }
    }

    pub fn fail_mint_confirmations_with(&self, err: BridgeError) {
        for ledger in self.ledgers.values() {
            ledger.fail_mint_confirmations_with(err.clone());
        }
    }
}

impl Default for FakeLedgerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerFactory for FakeLedgerFactory {
    fn connect(&self, network: &Network) -> Result<Arc<dyn LedgerClient>, BridgeError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let ledger = self
            .ledgers
            .get(&network.identifier)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownNetwork(network.identifier.clone()))?;
        Ok(ledger)
    }
}

// ============================================================================
// Scripted attestation service
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Script {
    CompleteAfter(u32),
    NeverComplete,
    AlwaysFailing,
}

/// Attestation service whose answers follow a fixed script
#[derive(Debug)]
pub struct ScriptedAttestationApi {
    script: Script,
    calls: AtomicU32,
}

impl ScriptedAttestationApi {
    /// Pending for the first `n - 1` requests, complete from the `n`th on
    pub fn complete_after(n: u32) -> Self {
        Self {
            script: Script::CompleteAfter(n),
            calls: AtomicU32::new(0),
        }
    }

    pub fn never_complete() -> Self {
        Self {
            script: Script::NeverComplete,
            calls: AtomicU32::new(0),
        }
    }

    /// Every request fails like an unavailable service
    pub fn always_failing() -> Self {
        Self {
            script: Script::AlwaysFailing,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationApi for ScriptedAttestationApi {
    async fn fetch(&self, message_hash: &MessageHash) -> Result<FetchOutcome, BridgeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script {
            Script::CompleteAfter(k) if n >= k => Ok(FetchOutcome::Complete(Attestation {
                message_hash: message_hash.clone(),
                signature_bytes: vec![0xab; 65],
                issued_at: Utc::now(),
            })),
            Script::CompleteAfter(_) | Script::NeverComplete => Ok(FetchOutcome::Pending {
                status: "pending_confirmations".to_string(),
            }),
            Script::AlwaysFailing => Err(BridgeError::network("attestation-service", "HTTP 503")),
        }
    }
}
