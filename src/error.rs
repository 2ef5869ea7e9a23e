// Error taxonomy surfaced at the desk's action boundary

use alloy_primitives::B256;

/// EIP-1193 code for a request the user declined in the wallet.
pub const USER_REJECTED_CODE: i64 = 4001;
/// EIP-1193 code returned by `wallet_switchEthereumChain` for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OtcError {
    #[error("No wallet provider detected: {0}")]
    WalletUnavailable(String),
    #[error("Request was rejected in the wallet")]
    UserRejected,
    #[error("Chain id {0} is not supported, switch to BNB Smart Chain")]
    UnsupportedNetwork(u64),
    #[error("Insufficient {asset} balance: need {required}, have {available}")]
    InsufficientBalance {
        asset: String,
        required: String,
        available: String,
    },
    #[error("Insufficient {asset} allowance: need {required}, approved {approved}. Approve {asset} first")]
    InsufficientAllowance {
        asset: String,
        required: String,
        approved: String,
    },
    #[error("Invalid address '{0}', expected a 0x-prefixed 20-byte hex address")]
    InvalidAddress(String),
    #[error("Transaction reverted: {reason}")]
    TransactionReverted {
        tx_hash: Option<B256>,
        reason: String,
    },
    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),
    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),
    #[error("Exchange rate for {0} is not set")]
    RateNotSet(String),
    #[error("Describe how you will pay before requesting off-platform instructions")]
    MissingPaymentInfo,
    #[error("Wallet is not connected")]
    NotConnected,
    #[error("Only the owner account can {0}")]
    NotOwner(&'static str),
    #[error("Trade {id} cannot be {action}: {reason}")]
    TradeUnavailable {
        id: u64,
        action: &'static str,
        reason: &'static str,
    },
    #[error("Another action is still waiting for confirmation")]
    Busy,
    #[error("Timed out waiting for transaction {0}")]
    ConfirmationTimeout(B256),
    #[error("Wallet RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Malformed wallet response: {0}")]
    Decode(String),
    #[error("Rate store error: {0}")]
    Storage(String),
}

impl OtcError {
    pub fn is_unrecognized_chain(&self) -> bool {
        matches!(self, OtcError::Rpc { code, .. } if *code == UNRECOGNIZED_CHAIN_CODE)
    }

    /// Errors that mean the wallet connection itself is gone.
    pub fn is_wallet_gone(&self) -> bool {
        matches!(self, OtcError::WalletUnavailable(_))
    }
}

impl From<alloy_sol_types::Error> for OtcError {
    fn from(value: alloy_sol_types::Error) -> Self {
        OtcError::Decode(value.to_string())
    }
}

impl From<serde_json::Error> for OtcError {
    fn from(value: serde_json::Error) -> Self {
        OtcError::Decode(value.to_string())
    }
}

pub type OtcResult<T> = std::result::Result<T, OtcError>;
