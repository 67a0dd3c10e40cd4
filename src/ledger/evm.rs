//! EVM ledger client
//!
//! Talks to one network's USDC, TokenMessenger and MessageTransmitter
//! contracts over JSON-RPC.
//!
//! # Transaction Building
//!
//! Write paths build a provider with `with_recommended_fillers()` so nonce,
//! gas limit and EIP-1559 fees are populated automatically. Providers are
//! built per call; nothing holds a connection between commands.
//!
//! Burns and mints are split into a submit step that returns as soon as the
//! transaction is broadcast and a confirm step that waits for its receipt.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolEvent;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::contracts::{MessageTransmitter, TokenMessenger, ERC20};
use super::{
    signer_from, BurnReceipt, LedgerClient, LedgerFactory, MessageHash, Receipt, TxId,
};
use crate::amount::TokenAmount;
use crate::attestation::Attestation;
use crate::error::{classify_error, BridgeError, ErrorClass};
use crate::hash::{address_to_bytes32, keccak256};
use crate::metrics;
use crate::redact::SigningCredential;
use crate::registry::Network;

/// How long a broadcast burn or mint may take to be included
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Ledger client for one EVM test network
pub struct EvmLedger {
    network: Network,
    rpc_url: String,
    decimals: OnceCell<u8>,
}

impl EvmLedger {
    /// Bind a client to a network. Fails when no RPC endpoint is configured.
    pub fn new(network: Network) -> Result<Self, BridgeError> {
        let rpc_url = network.rpc_endpoint()?.to_string();

        debug!(
            chain = %network.identifier,
            chain_id = network.chain_id,
            usdc = %network.token_contract_address,
            "EVM ledger client created"
        );

        Ok(Self {
            network,
            rpc_url,
            decimals: OnceCell::new(),
        })
    }

    fn url(&self) -> Result<Url, BridgeError> {
        self.rpc_url.parse().map_err(|_| {
            BridgeError::Configuration(format!("invalid RPC URL for {}", self.network.identifier))
        })
    }

    fn chain(&self) -> &str {
        &self.network.identifier
    }

    /// Map a raw provider/contract error into the taxonomy
    fn chain_error(&self, action: &str, err: impl fmt::Display) -> BridgeError {
        let message = format!("{action}: {err}");
        let mapped = match classify_error(&message) {
            ErrorClass::InsufficientFunds => BridgeError::InsufficientFunds {
                chain: self.chain().to_string(),
                balance: "unknown".to_string(),
                requested: "unknown".to_string(),
            },
            ErrorClass::Reverted => BridgeError::Reverted {
                chain: self.chain().to_string(),
                message,
            },
            ErrorClass::Transient | ErrorClass::Unknown => BridgeError::network(self.chain(), message),
        };
        metrics::record_ledger_error(self.chain(), mapped.kind());
        mapped
    }

    fn check_decimals(&self, amount: &TokenAmount, decimals: u8) -> Result<(), BridgeError> {
        if amount.decimals() != decimals {
            return Err(BridgeError::InvalidInput(format!(
                "amount uses {} decimals but USDC on {} has {}",
                amount.decimals(),
                self.chain(),
                decimals
            )));
        }
        Ok(())
    }

    /// Balance check run before every write
    async fn ensure_funds(&self, owner: Address, amount: &TokenAmount) -> Result<(), BridgeError> {
        let balance = self.get_balance(owner).await?;
        if balance.raw() < amount.raw() {
            warn!(
                chain = %self.chain(),
                balance = %balance,
                requested = %amount,
                "Insufficient USDC balance"
            );
            return Err(BridgeError::InsufficientFunds {
                chain: self.chain().to_string(),
                balance: balance.to_string(),
                requested: amount.to_string(),
            });
        }
        Ok(())
    }

    fn tx_hash(&self, tx_id: &TxId) -> Result<B256, BridgeError> {
        tx_id
            .as_str()
            .parse()
            .map_err(|_| BridgeError::InvalidInput(format!("malformed transaction id: {tx_id}")))
    }

    /// Poll for the receipt of a broadcast transaction until it is included
    /// or [`RECEIPT_TIMEOUT`] passes
    async fn wait_for_receipt(&self, tx_id: &TxId) -> Result<TransactionReceipt, BridgeError> {
        let hash = self.tx_hash(tx_id)?;
        let provider = ProviderBuilder::new().on_http(self.url()?);
        let start = Instant::now();

        while start.elapsed() < RECEIPT_TIMEOUT {
            let receipt = provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| self.chain_error("failed to get transaction receipt", e))?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }

        Err(BridgeError::network(
            self.chain(),
            format!("transaction {tx_id} not included after {:?}", RECEIPT_TIMEOUT),
        ))
    }
}

#[async_trait]
impl LedgerClient for EvmLedger {
    fn network(&self) -> &Network {
        &self.network
    }

    async fn token_decimals(&self) -> Result<u8, BridgeError> {
        let decimals = self
            .decimals
            .get_or_try_init(|| async {
                let provider = ProviderBuilder::new().on_http(self.url()?);
                let token = ERC20::new(self.network.token_contract_address, &provider);
                let result = token
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| self.chain_error("failed to read USDC decimals", e))?;
                Ok::<u8, BridgeError>(result._0)
            })
            .await?;
        Ok(*decimals)
    }

    async fn get_balance(&self, account: Address) -> Result<TokenAmount, BridgeError> {
        let decimals = self.token_decimals().await?;

        let provider = ProviderBuilder::new().on_http(self.url()?);
        let token = ERC20::new(self.network.token_contract_address, &provider);
        let result = token
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| self.chain_error("failed to get USDC balance", e))?;

        Ok(TokenAmount::from_raw(result._0, decimals))
    }

    async fn submit_transfer(
        &self,
        to: Address,
        amount: TokenAmount,
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError> {
        let signer = signer_from(credential)?;
        let from = signer.address();

        self.check_decimals(&amount, self.token_decimals().await?)?;
        self.ensure_funds(from, &amount).await?;

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.url()?);

        let token = ERC20::new(self.network.token_contract_address, &provider);
        let pending_tx = token
            .transfer(to, amount.raw())
            .send()
            .await
            .map_err(|e| self.chain_error("failed to send transfer tx", e))?;

        let tx_hash = *pending_tx.tx_hash();
        metrics::record_ledger_write(self.chain(), "transfer");
        info!(
            chain = %self.chain(),
            tx_hash = %tx_hash,
            from = %from,
            to = %to,
            amount = %amount,
            "USDC transfer broadcast"
        );

        Ok(TxId::from_bytes(&tx_hash.0))
    }

    async fn submit_burn(
        &self,
        amount: TokenAmount,
        destination: &Network,
        recipient: Address,
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError> {
        let signer = signer_from(credential)?;
        let owner = signer.address();

        self.check_decimals(&amount, self.token_decimals().await?)?;
        self.ensure_funds(owner, &amount).await?;

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.url()?);

        let messenger_address = self.network.bridge_sender_contract;
        let token = ERC20::new(self.network.token_contract_address, &provider);

        // 1. Approve the TokenMessenger unless the allowance already covers the burn
        let allowance = token
            .allowance(owner, messenger_address)
            .call()
            .await
            .map_err(|e| self.chain_error("failed to read allowance", e))?
            ._0;

        if allowance < amount.raw() {
            let approve_receipt = token
                .approve(messenger_address, amount.raw())
                .send()
                .await
                .map_err(|e| self.chain_error("failed to send approve tx", e))?
                .get_receipt()
                .await
                .map_err(|e| self.chain_error("failed to get approve receipt", e))?;

            if !approve_receipt.status() {
                return Err(BridgeError::Reverted {
                    chain: self.chain().to_string(),
                    message: format!(
                        "approve transaction {} reverted",
                        approve_receipt.transaction_hash
                    ),
                });
            }
            metrics::record_ledger_write(self.chain(), "approve");
            debug!(
                chain = %self.chain(),
                tx_hash = %approve_receipt.transaction_hash,
                spender = %messenger_address,
                "TokenMessenger approved"
            );
        }

        // 2. Burn. The receipt is awaited separately so the caller can
        // persist the hash before waiting on inclusion.
        let messenger = TokenMessenger::new(messenger_address, &provider);
        let pending_tx = messenger
            .depositForBurn(
                amount.raw(),
                destination.cctp_domain,
                address_to_bytes32(&recipient),
                self.network.token_contract_address,
            )
            .send()
            .await
            .map_err(|e| self.chain_error("failed to send depositForBurn tx", e))?;

        let tx_hash = *pending_tx.tx_hash();
        metrics::record_ledger_write(self.chain(), "burn");
        info!(
            chain = %self.chain(),
            tx_hash = %tx_hash,
            destination = %destination.identifier,
            destination_domain = destination.cctp_domain,
            amount = %amount,
            "Burn transaction sent"
        );

        Ok(TxId::from_bytes(&tx_hash.0))
    }

    async fn confirm_burn(&self, tx_id: &TxId) -> Result<BurnReceipt, BridgeError> {
        let receipt = self.wait_for_receipt(tx_id).await?;

        if !receipt.status() {
            return Err(BridgeError::Reverted {
                chain: self.chain().to_string(),
                message: format!("depositForBurn transaction {tx_id} reverted"),
            });
        }

        let message = receipt
            .inner
            .logs()
            .iter()
            .find_map(|log| MessageTransmitter::MessageSent::decode_log(&log.inner, true).ok())
            .map(|event| event.data.message.to_vec())
            .ok_or_else(|| BridgeError::Reverted {
                chain: self.chain().to_string(),
                message: format!("MessageSent event not found in burn receipt {tx_id}"),
            })?;

        let message_hash = MessageHash::from_bytes(&keccak256(&message));
        debug!(
            tx_hash = %tx_id,
            message_hash = %message_hash,
            message_len = message.len(),
            "Extracted CCTP message from burn receipt"
        );

        Ok(BurnReceipt {
            tx_id: tx_id.clone(),
            message_hash,
            message,
        })
    }

    async fn submit_mint(
        &self,
        attestation: &Attestation,
        message: &[u8],
        credential: &SigningCredential,
    ) -> Result<TxId, BridgeError> {
        let wallet = EthereumWallet::from(signer_from(credential)?);
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.url()?);

        let transmitter = MessageTransmitter::new(self.network.bridge_receiver_contract, &provider);
        let call = transmitter.receiveMessage(
            Bytes::from(message.to_vec()),
            Bytes::from(attestation.signature_bytes.clone()),
        );

        // Gas estimation surfaces contract reverts at send time
        let pending_tx = call.send().await.map_err(|e| {
            match self.chain_error("failed to send receiveMessage tx", e) {
                BridgeError::Reverted { message, .. } => BridgeError::AttestationRejected(message),
                other => other,
            }
        })?;

        let tx_hash = *pending_tx.tx_hash();
        metrics::record_ledger_write(self.chain(), "mint");
        info!(
            chain = %self.chain(),
            tx_hash = %tx_hash,
            message_hash = %attestation.message_hash,
            "Mint transaction sent"
        );

        Ok(TxId::from_bytes(&tx_hash.0))
    }

    async fn confirm_mint(&self, tx_id: &TxId) -> Result<(), BridgeError> {
        let receipt = self.wait_for_receipt(tx_id).await?;
        if !receipt.status() {
            return Err(BridgeError::AttestationRejected(format!(
                "receiveMessage transaction {tx_id} reverted"
            )));
        }
        Ok(())
    }

    async fn get_receipt(&self, tx_id: &TxId) -> Result<Option<Receipt>, BridgeError> {
        let hash = self.tx_hash(tx_id)?;
        let provider = ProviderBuilder::new().on_http(self.url()?);

        let Some(receipt) = provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.chain_error("failed to get transaction receipt", e))?
        else {
            return Ok(None);
        };

        let confirmations = match receipt.block_number {
            Some(block) => {
                let head = provider
                    .get_block_number()
                    .await
                    .map_err(|e| self.chain_error("failed to get block number", e))?;
                head.saturating_sub(block) + 1
            }
            None => 0,
        };

        Ok(Some(Receipt {
            confirmations,
            succeeded: receipt.status(),
        }))
    }
}

/// Builds [`EvmLedger`] clients
#[derive(Debug, Default, Clone, Copy)]
pub struct EvmLedgerFactory;

impl LedgerFactory for EvmLedgerFactory {
    fn connect(&self, network: &Network) -> Result<Arc<dyn LedgerClient>, BridgeError> {
        Ok(Arc::new(EvmLedger::new(network.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_registry;

    #[test]
    fn test_requires_rpc_endpoint() {
        let mut network = test_registry().resolve("base-sepolia").unwrap().clone();
        network.rpc_endpoint = None;
        assert!(matches!(
            EvmLedger::new(network),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_chain_error_mapping() {
        let network = test_registry().resolve("base-sepolia").unwrap().clone();
        let ledger = EvmLedger::new(network).unwrap();

        assert!(matches!(
            ledger.chain_error("send", "connection refused"),
            BridgeError::NetworkUnavailable { .. }
        ));
        assert!(matches!(
            ledger.chain_error("send", "execution reverted: ERC20: burn amount exceeds balance"),
            BridgeError::InsufficientFunds { .. }
        ));
        assert!(matches!(
            ledger.chain_error("send", "execution reverted: Invalid message"),
            BridgeError::Reverted { .. }
        ));
    }

    #[test]
    fn test_factory_binds_network() {
        let network = test_registry().resolve("arbitrum-sepolia").unwrap().clone();
        let client = EvmLedgerFactory.connect(&network).unwrap();
        assert_eq!(client.network().chain_id, 421614);
    }

    #[tokio::test]
    #[ignore = "requires BASE_SEPOLIA_RPC"]
    async fn test_live_decimals() {
        let rpc = std::env::var("BASE_SEPOLIA_RPC").unwrap();
        let mut network = test_registry().resolve("base-sepolia").unwrap().clone();
        network.rpc_endpoint = Some(rpc);
        let ledger = EvmLedger::new(network).unwrap();
        assert_eq!(ledger.token_decimals().await.unwrap(), 6);
    }
}
