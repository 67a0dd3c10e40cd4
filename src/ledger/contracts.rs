//! CCTP and ERC20 contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings. Only the entry
//! points the agent calls are declared.

use alloy::sol;

sol! {
    /// USDC token (standard ERC20 surface)
    #[sol(rpc)]
    contract ERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// CCTP TokenMessenger: burn side of a cross-chain transfer
    #[sol(rpc)]
    contract TokenMessenger {
        /// Burn `amount` of `burnToken` and emit a message for `destinationDomain`
        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken
        ) external returns (uint64 nonce);
    }

    /// CCTP MessageTransmitter: emits burn messages, redeems attested ones
    #[sol(rpc)]
    contract MessageTransmitter {
        /// Redeem an attested message on the destination chain
        function receiveMessage(bytes message, bytes attestation) external returns (bool success);

        /// Emitted on the source chain for every burn
        event MessageSent(bytes message);
    }
}
