//! Hashing and bytes32 helpers for CCTP messages
//!
//! A CCTP message is identified by `keccak256(message_bytes)`, and mint
//! recipients travel as left-padded `bytes32`.

use alloy::primitives::{Address, FixedBytes};
use tiny_keccak::{Hasher, Keccak};

use crate::error::BridgeError;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Left-pad an EVM address to the bytes32 `mintRecipient` form
pub fn address_to_bytes32(addr: &Address) -> FixedBytes<32> {
    let mut result = [0u8; 32];
    result[12..32].copy_from_slice(addr.as_slice());
    FixedBytes::from(result)
}

/// Convert bytes32 to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a 0x-prefixed 32-byte hex string
pub fn parse_bytes32(value: &str) -> Result<[u8; 32], BridgeError> {
    let stripped = value
        .strip_prefix("0x")
        .ok_or_else(|| BridgeError::InvalidInput(format!("expected 0x prefix: {value}")))?;
    let bytes = hex::decode(stripped)
        .map_err(|_| BridgeError::InvalidInput(format!("not valid hex: {value}")))?;
    bytes
        .try_into()
        .map_err(|_| BridgeError::InvalidInput(format!("expected 32 bytes: {value}")))
}

/// `true` for a string shaped like a message hash or transaction hash
pub fn is_bytes32_hex(value: &str) -> bool {
    parse_bytes32(value).is_ok()
}
