// Desk configuration: contract addresses, accepted chains and gas policy.
// Every field can be overridden by a CLI flag or an OTC_* environment variable.

use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use clap::Args;

use crate::types::parse_amount;

pub const DEFAULT_TOKEN_ADDRESS: Address = address!("f8798a4b7b2560d2e5627abd1a13a0a02899a3be");
pub const DEFAULT_STABLE_ADDRESS: Address = address!("55d398326f99059fF775485246999027B3197955");
pub const DEFAULT_ESCROW_ADDRESS: Address = address!("10773dAdA1467A7dCbED91411213033498a41F3F");
pub const DEFAULT_RECEIVER_ADDRESS: Address = address!("44Ddfb309F65FF9Bd053271fAAEBA46F71204d6d");

pub const BSC_MAINNET: u64 = 56;
pub const BSC_TESTNET: u64 = 97;

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// WebSocket JSON-RPC endpoint exposed by the wallet
    #[arg(long, env = "OTC_WALLET_URL", default_value = "ws://127.0.0.1:1248")]
    pub wallet_url: String,

    #[arg(long, env = "OTC_TOKEN_ADDRESS", default_value = "0xf8798a4b7b2560d2e5627abd1a13a0a02899a3be")]
    pub token_address: Address,

    #[arg(long, env = "OTC_STABLE_ADDRESS", default_value = "0x55d398326f99059fF775485246999027B3197955")]
    pub stable_address: Address,

    #[arg(long, env = "OTC_ESCROW_ADDRESS", default_value = "0x10773dAdA1467A7dCbED91411213033498a41F3F")]
    pub escrow_address: Address,

    /// Receives purchase payments; the same account is treated as the desk owner
    #[arg(long, env = "OTC_RECEIVER_ADDRESS", default_value = "0x44Ddfb309F65FF9Bd053271fAAEBA46F71204d6d")]
    pub receiver_address: Address,

    #[arg(long, env = "OTC_ACCEPTED_CHAINS", value_delimiter = ',', default_values_t = [BSC_MAINNET, BSC_TESTNET])]
    pub accepted_chains: Vec<u64>,

    /// Percentage applied to the network gas price (120 = +20%)
    #[arg(long, env = "OTC_GAS_PRICE_MARGIN", default_value_t = 120)]
    pub gas_price_margin_percent: u64,

    /// Percentage applied to estimated gas for escrow calls
    #[arg(long, env = "OTC_GAS_ESTIMATE_MARGIN", default_value_t = 150)]
    pub gas_estimate_margin_percent: u64,

    #[arg(long, env = "OTC_TRANSFER_GAS_LIMIT", default_value_t = 100_000)]
    pub transfer_gas_limit: u64,

    /// Fixed ceiling used when escrow gas estimation fails
    #[arg(long, env = "OTC_TRADE_GAS_LIMIT", default_value_t = 1_000_000)]
    pub trade_gas_limit: u64,

    /// Amount approved by the approve actions, in whole tokens
    #[arg(long, env = "OTC_APPROVAL_AMOUNT", default_value = "10000000")]
    pub approval_amount: String,

    #[arg(long, env = "OTC_RATES_PATH", default_value = "otc_rates.json")]
    pub rates_path: PathBuf,

    #[arg(long, env = "OTC_RECEIPT_POLL_MS", default_value_t = 1_500)]
    pub receipt_poll_ms: u64,

    #[arg(long, env = "OTC_RECEIPT_TIMEOUT_SECS", default_value_t = 180)]
    pub receipt_timeout_secs: u64,

    #[arg(long, env = "OTC_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long, env = "OTC_TOKEN_SYMBOL", default_value = "TJCD")]
    pub token_symbol: String,

    #[arg(long, env = "OTC_NATIVE_SYMBOL", default_value = "BNB")]
    pub native_symbol: String,

    #[arg(long, env = "OTC_STABLE_SYMBOL", default_value = "USDT")]
    pub stable_symbol: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallet_url: "ws://127.0.0.1:1248".to_string(),
            token_address: DEFAULT_TOKEN_ADDRESS,
            stable_address: DEFAULT_STABLE_ADDRESS,
            escrow_address: DEFAULT_ESCROW_ADDRESS,
            receiver_address: DEFAULT_RECEIVER_ADDRESS,
            accepted_chains: vec![BSC_MAINNET, BSC_TESTNET],
            gas_price_margin_percent: 120,
            gas_estimate_margin_percent: 150,
            transfer_gas_limit: 100_000,
            trade_gas_limit: 1_000_000,
            approval_amount: "10000000".to_string(),
            rates_path: PathBuf::from("otc_rates.json"),
            receipt_poll_ms: 1_500,
            receipt_timeout_secs: 180,
            log_dir: PathBuf::from("logs"),
            token_symbol: "TJCD".to_string(),
            native_symbol: "BNB".to_string(),
            stable_symbol: "USDT".to_string(),
        }
    }
}

impl Config {
    /// The chain the desk asks the wallet to switch to.
    pub fn primary_chain(&self) -> u64 {
        self.accepted_chains.first().copied().unwrap_or(BSC_MAINNET)
    }

    pub fn approval_amount(&self) -> anyhow::Result<U256> {
        parse_amount(&self.approval_amount)
            .map_err(|e| anyhow::anyhow!("Invalid OTC_APPROVAL_AMOUNT: {}", e))
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Parameters for `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub currency_name: String,
    pub currency_symbol: String,
    pub currency_decimals: u8,
    pub rpc_urls: Vec<String>,
    pub explorer_urls: Vec<String>,
}

impl ChainParams {
    pub fn for_chain(chain_id: u64) -> Self {
        match chain_id {
            BSC_TESTNET => Self {
                chain_id,
                chain_name: "BNB Smart Chain Testnet".to_string(),
                currency_name: "BNB".to_string(),
                currency_symbol: "tBNB".to_string(),
                currency_decimals: 18,
                rpc_urls: vec!["https://data-seed-prebsc-1-s1.binance.org:8545/".to_string()],
                explorer_urls: vec!["https://testnet.bscscan.com/".to_string()],
            },
            _ => Self {
                chain_id,
                chain_name: "Binance Smart Chain".to_string(),
                currency_name: "BNB".to_string(),
                currency_symbol: "BNB".to_string(),
                currency_decimals: 18,
                rpc_urls: vec!["https://bsc-dataseed.binance.org/".to_string()],
                explorer_urls: vec!["https://bscscan.com/".to_string()],
            },
        }
    }
}
