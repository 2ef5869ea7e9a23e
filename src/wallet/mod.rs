// Wallet provider surface consumed by the desk (EIP-1193 style)

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::ChainParams;
use crate::error::{OtcError, OtcResult};

pub mod rpc;
pub mod session;

pub use rpc::RpcWallet;
pub use session::{SessionChange, SessionManager};

/// Provider-driven notifications. They can arrive at any time, including
/// while an action is waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnected,
}

/// A transaction or call as handed to the wallet. `from` is filled in by the
/// wallet when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<u64>,
    pub gas_price: Option<U256>,
}

impl TxRequest {
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn gas(mut self, gas: u64, gas_price: U256) -> Self {
        self.gas = Some(gas);
        self.gas_price = Some(gas_price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub logs: Vec<LogEntry>,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// `eth_requestAccounts`: prompts the user when the site is not yet authorized.
    async fn request_accounts(&self) -> OtcResult<Vec<Address>>;
    async fn chain_id(&self) -> OtcResult<u64>;
    async fn get_balance(&self, address: Address) -> OtcResult<U256>;
    async fn gas_price(&self) -> OtcResult<U256>;
    async fn call(&self, tx: &TxRequest) -> OtcResult<Bytes>;
    async fn estimate_gas(&self, tx: &TxRequest) -> OtcResult<u64>;
    /// Asks the wallet to sign and broadcast; returns the transaction hash.
    async fn send_transaction(&self, tx: &TxRequest) -> OtcResult<B256>;
    /// Resolves once the transaction is included in one block.
    async fn wait_for_receipt(&self, tx_hash: B256) -> OtcResult<TxReceipt>;
    async fn switch_chain(&self, chain_id: u64) -> OtcResult<()>;
    async fn add_chain(&self, params: &ChainParams) -> OtcResult<()>;
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Stand-in used when no wallet endpoint could be reached. Every request
/// fails with `WalletUnavailable`.
pub struct UnavailableWallet {
    reason: String,
    events: broadcast::Sender<WalletEvent>,
}

impl UnavailableWallet {
    pub fn new(reason: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(1);
        Self {
            reason: reason.into(),
            events,
        }
    }

    fn unavailable<T>(&self) -> OtcResult<T> {
        Err(OtcError::WalletUnavailable(self.reason.clone()))
    }
}

#[async_trait]
impl WalletProvider for UnavailableWallet {
    async fn request_accounts(&self) -> OtcResult<Vec<Address>> {
        self.unavailable()
    }

    async fn chain_id(&self) -> OtcResult<u64> {
        self.unavailable()
    }

    async fn get_balance(&self, _address: Address) -> OtcResult<U256> {
        self.unavailable()
    }

    async fn gas_price(&self) -> OtcResult<U256> {
        self.unavailable()
    }

    async fn call(&self, _tx: &TxRequest) -> OtcResult<Bytes> {
        self.unavailable()
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> OtcResult<u64> {
        self.unavailable()
    }

    async fn send_transaction(&self, _tx: &TxRequest) -> OtcResult<B256> {
        self.unavailable()
    }

    async fn wait_for_receipt(&self, _tx_hash: B256) -> OtcResult<TxReceipt> {
        self.unavailable()
    }

    async fn switch_chain(&self, _chain_id: u64) -> OtcResult<()> {
        self.unavailable()
    }

    async fn add_chain(&self, _params: &ChainParams) -> OtcResult<()> {
        self.unavailable()
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
