//! Environment Gate
//!
//! Every command passes through [`EnvironmentGate::authorize`] before any
//! ledger client exists. Simulated runs are gated too.

use std::sync::Arc;
use tracing::warn;

use crate::error::BridgeError;
use crate::registry::{is_production_chain_id, is_production_identifier, ChainRegistry, Network};

/// Test-mode guard in front of the Chain Registry
#[derive(Debug, Clone)]
pub struct EnvironmentGate {
    test_mode: Option<bool>,
    registry: Arc<ChainRegistry>,
}

impl EnvironmentGate {
    pub fn new(test_mode: Option<bool>, registry: Arc<ChainRegistry>) -> Self {
        Self {
            test_mode,
            registry,
        }
    }

    /// Fails unless test mode was explicitly asserted
    pub fn ensure_test_mode(&self) -> Result<(), BridgeError> {
        match self.test_mode {
            Some(true) => Ok(()),
            Some(false) => Err(BridgeError::Configuration(
                "test mode is disabled (TESTNET=true required)".to_string(),
            )),
            None => Err(BridgeError::Configuration(
                "test mode was not asserted; refusing to run".to_string(),
            )),
        }
    }

    /// Resolve a network identifier, refusing anything outside the test environment
    pub fn authorize(&self, identifier: &str) -> Result<Network, BridgeError> {
        self.ensure_test_mode()?;

        if is_production_identifier(identifier) {
            warn!(network = %identifier, "Rejected production network identifier");
            return Err(BridgeError::Configuration(format!(
                "{identifier} is a production network; only test networks are allowed"
            )));
        }

        let network = self.registry.resolve(identifier)?;

        if !network.is_test || is_production_chain_id(network.chain_id) {
            warn!(
                network = %identifier,
                chain_id = network.chain_id,
                "Rejected network resolving to a production chain"
            );
            return Err(BridgeError::Configuration(format!(
                "{identifier} resolves to production chain {}",
                network.chain_id
            )));
        }

        Ok(network.clone())
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_registry;

    #[test]
    fn test_authorizes_registered_test_network() {
        let gate = EnvironmentGate::new(Some(true), test_registry());
        let network = gate.authorize("arbitrum-sepolia").unwrap();
        assert_eq!(network.chain_id, 421614);
        assert!(network.is_test);
    }

    #[test]
    fn test_requires_explicit_test_mode() {
        let absent = EnvironmentGate::new(None, test_registry());
        assert!(matches!(
            absent.authorize("base-sepolia"),
            Err(BridgeError::Configuration(_))
        ));

        let disabled = EnvironmentGate::new(Some(false), test_registry());
        assert!(matches!(
            disabled.authorize("base-sepolia"),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_production_identifiers() {
        let gate = EnvironmentGate::new(Some(true), test_registry());
        for id in ["base", "ethereum", "arbitrum-one", "polygon-mainnet"] {
            assert!(
                matches!(gate.authorize(id), Err(BridgeError::Configuration(_))),
                "{id} should be rejected as production"
            );
        }
    }

    #[test]
    fn test_rejects_unregistered_network() {
        let gate = EnvironmentGate::new(Some(true), test_registry());
        assert_eq!(
            gate.authorize("holesky").unwrap_err(),
            BridgeError::UnknownNetwork("holesky".to_string())
        );
    }
}
