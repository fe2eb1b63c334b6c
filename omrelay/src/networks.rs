//! Default chain parameters for transfers recognized from free text.
//!
//! A spoken transfer names only an amount, a token and a recipient. Chain
//! id, RPC endpoint and token contract come from [`TransferDefaults`].

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Public Base Sepolia RPC endpoint.
pub const BASE_SEPOLIA_RPC_URL: &str = "https://sepolia.base.org";

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// Token decimals for USDC.
pub const USDC_DECIMALS: u8 = 6;

/// Chain parameters applied to transfers parsed from natural language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDefaults {
    /// USDC contract used when the utterance names USDC.
    #[serde(default = "default_token_address")]
    pub token_address: Address,
    /// EIP-155 chain id.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// RPC endpoint handed to the chain-execution service.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
}

const fn default_token_address() -> Address {
    USDC_BASE_SEPOLIA
}

const fn default_chain_id() -> u64 {
    BASE_SEPOLIA
}

fn default_rpc_url() -> String {
    BASE_SEPOLIA_RPC_URL.to_owned()
}

impl Default for TransferDefaults {
    fn default() -> Self {
        Self {
            token_address: default_token_address(),
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
        }
    }
}
