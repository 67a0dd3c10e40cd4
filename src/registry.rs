//! Chain Registry
//!
//! Static per-network configuration. The catalogue of supported test networks
//! is compiled in; endpoints and contract addresses come from configuration.
//! The registry is built once at startup and never mutated afterwards.

use alloy::primitives::Address;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::config::{Config, NetworkConfig};
use crate::error::BridgeError;

/// A supported CCTP test network
#[derive(Debug, Clone, Copy)]
pub struct KnownNetwork {
    pub identifier: &'static str,
    pub chain_id: u64,
    /// Circle CCTP domain id
    pub cctp_domain: u32,
    /// Environment variable prefix, e.g. `BASE_SEPOLIA`
    pub env_prefix: &'static str,
    pub default_usdc: &'static str,
    pub default_token_messenger: &'static str,
    pub default_message_transmitter: &'static str,
}

pub const TEST_NETWORKS: &[KnownNetwork] = &[
    KnownNetwork {
        identifier: "base-sepolia",
        chain_id: 84532,
        cctp_domain: 6,
        env_prefix: "BASE_SEPOLIA",
        default_usdc: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
        default_token_messenger: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
        default_message_transmitter: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
    },
    KnownNetwork {
        identifier: "arbitrum-sepolia",
        chain_id: 421614,
        cctp_domain: 3,
        env_prefix: "ARBITRUM_SEPOLIA",
        default_usdc: "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d",
        default_token_messenger: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
        default_message_transmitter: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
    },
];

pub const DEFAULT_NETWORK: &str = "base-sepolia";

/// Identifiers of production chains. Never resolvable.
const PRODUCTION_IDENTIFIERS: &[&str] = &[
    "mainnet",
    "ethereum",
    "ethereum-mainnet",
    "eth",
    "base",
    "base-mainnet",
    "arbitrum",
    "arbitrum-one",
    "arbitrum-mainnet",
    "optimism",
    "op-mainnet",
    "polygon",
    "polygon-pos",
    "avalanche",
    "avalanche-c",
    "solana",
    "solana-mainnet",
    "noble",
];

/// Chain ids of production chains (Ethereum, OP, Polygon, Base, Arbitrum, Avalanche, Unichain)
const PRODUCTION_CHAIN_IDS: &[u64] = &[1, 10, 137, 8453, 42161, 43114, 130];

pub fn is_production_identifier(identifier: &str) -> bool {
    let normalized = identifier.trim().to_lowercase();
    PRODUCTION_IDENTIFIERS.contains(&normalized.as_str()) || normalized.contains("mainnet")
}

pub fn is_production_chain_id(chain_id: u64) -> bool {
    PRODUCTION_CHAIN_IDS.contains(&chain_id)
}

pub fn known_network(identifier: &str) -> Option<&'static KnownNetwork> {
    TEST_NETWORKS.iter().find(|n| n.identifier == identifier)
}

/// Resolved configuration of one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Network {
    pub identifier: String,
    pub is_test: bool,
    pub chain_id: u64,
    pub cctp_domain: u32,
    /// None when the operator did not configure an endpoint for this network
    pub rpc_endpoint: Option<String>,
    pub token_contract_address: Address,
    /// CCTP TokenMessenger (burn entry point)
    pub bridge_sender_contract: Address,
    /// CCTP MessageTransmitter (redemption entry point)
    pub bridge_receiver_contract: Address,
    pub required_confirmations: u64,
}

impl Network {
    pub fn rpc_endpoint(&self) -> Result<&str, BridgeError> {
        self.rpc_endpoint.as_deref().ok_or_else(|| {
            BridgeError::Configuration(format!(
                "no RPC endpoint configured for {}",
                self.identifier
            ))
        })
    }
}

/// Immutable lookup table of configured networks
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    networks: BTreeMap<String, Network>,
}

impl ChainRegistry {
    /// Build the registry from validated configuration
    pub fn from_config(config: &Config) -> Result<Self, BridgeError> {
        Self::from_networks(&config.networks)
    }

    pub fn from_networks(configs: &[NetworkConfig]) -> Result<Self, BridgeError> {
        let mut networks = BTreeMap::new();

        for cfg in configs {
            if is_production_identifier(&cfg.identifier) || is_production_chain_id(cfg.chain_id) {
                return Err(BridgeError::Configuration(format!(
                    "network {} (chain {}) looks like a production network; refusing to register it",
                    cfg.identifier, cfg.chain_id
                )));
            }

            let network = Network {
                identifier: cfg.identifier.clone(),
                is_test: true,
                chain_id: cfg.chain_id,
                cctp_domain: cfg.cctp_domain,
                rpc_endpoint: cfg.rpc_url.clone(),
                token_contract_address: parse_address(&cfg.identifier, "USDC", &cfg.usdc_address)?,
                bridge_sender_contract: parse_address(
                    &cfg.identifier,
                    "TOKEN_MESSENGER",
                    &cfg.token_messenger_address,
                )?,
                bridge_receiver_contract: parse_address(
                    &cfg.identifier,
                    "MESSAGE_TRANSMITTER",
                    &cfg.message_transmitter_address,
                )?,
                required_confirmations: cfg.required_confirmations,
            };

            if networks.insert(network.identifier.clone(), network).is_some() {
                return Err(BridgeError::Configuration(format!(
                    "network {} configured twice",
                    cfg.identifier
                )));
            }
        }

        Ok(Self { networks })
    }

    /// Look up a network by identifier
    pub fn resolve(&self, identifier: &str) -> Result<&Network, BridgeError> {
        self.networks
            .get(identifier)
            .ok_or_else(|| BridgeError::UnknownNetwork(identifier.to_string()))
    }

    pub fn all(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.networks.contains_key(identifier)
    }
}

fn parse_address(network: &str, field: &str, value: &str) -> Result<Address, BridgeError> {
    Address::from_str(value.trim()).map_err(|_| {
        BridgeError::Configuration(format!("invalid {field} address for {network}: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_network_configs;

    #[test]
    fn test_resolve_known_networks() {
        let registry = ChainRegistry::from_networks(&test_network_configs()).unwrap();
        let base = registry.resolve("base-sepolia").unwrap();
        assert_eq!(base.chain_id, 84532);
        assert_eq!(base.cctp_domain, 6);
        assert!(base.is_test);
        assert_eq!(registry.all().count(), 2);
    }

    #[test]
    fn test_unknown_network() {
        let registry = ChainRegistry::from_networks(&test_network_configs()).unwrap();
        let err = registry.resolve("goerli").unwrap_err();
        assert_eq!(err, BridgeError::UnknownNetwork("goerli".to_string()));
    }

    #[test]
    fn test_production_network_unrepresentable() {
        let mut configs = test_network_configs();
        configs[0].chain_id = 8453;
        assert!(matches!(
            ChainRegistry::from_networks(&configs),
            Err(BridgeError::Configuration(_))
        ));

        let mut configs = test_network_configs();
        configs[1].identifier = "arbitrum-one".to_string();
        assert!(ChainRegistry::from_networks(&configs).is_err());
    }

    #[test]
    fn test_invalid_contract_address() {
        let mut configs = test_network_configs();
        configs[0].usdc_address = "0xnot-an-address".to_string();
        let err = ChainRegistry::from_networks(&configs).unwrap_err();
        assert!(err.to_string().contains("USDC"));
    }

    #[test]
    fn test_production_identifier_detection() {
        assert!(is_production_identifier("base"));
        assert!(is_production_identifier("Ethereum"));
        assert!(is_production_identifier("optimism-mainnet"));
        assert!(!is_production_identifier("base-sepolia"));
        assert!(!is_production_identifier("arbitrum-sepolia"));
        assert!(is_production_chain_id(1));
        assert!(!is_production_chain_id(84532));
    }

    #[test]
    fn test_missing_rpc_endpoint_is_configuration_error() {
        let mut configs = test_network_configs();
        configs[0].rpc_url = None;
        let registry = ChainRegistry::from_networks(&configs).unwrap();
        let network = registry.resolve("base-sepolia").unwrap();
        assert!(matches!(
            network.rpc_endpoint(),
            Err(BridgeError::Configuration(_))
        ));
    }
}
