// Typed proxies over the deployed token and escrow contracts.
// Reads go through eth_call; writes carry explicit gas parameters from GasPolicy.

use alloy_primitives::{Address, U256};
use alloy_sol_types::sol;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::OtcError;
use crate::wallet::{TxReceipt, TxRequest, WalletProvider};

pub mod escrow;
pub mod token;

pub use escrow::EscrowProxy;
pub use token::TokenProxy;

sol! {
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    interface IOtcEscrow {
        function tjcdToken() external view returns (address);
        function tradeCounter() external view returns (uint256);
        function trades(uint256 index) external view returns (
            address seller,
            address buyer,
            uint256 amount,
            uint256 tradeId,
            bool isReleased,
            bool isCancelled
        );
        function createTrade(address buyer, uint256 amount) external returns (uint256);
        function releaseTrade(uint256 tradeId) external;
        function cancelTrade(uint256 tradeId) external;
        function resolveDispute(uint256 tradeId, address recipient) external;

        event TradeCreated(uint256 indexed tradeId, address indexed seller, address indexed buyer, uint256 amount);
        event TradeReleased(uint256 indexed tradeId);
        event TradeCancelled(uint256 indexed tradeId);
    }
}

/// Where a transaction's gas limit came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasLimitSource {
    Estimated { estimate: u64 },
    Fixed,
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasLimit {
    pub limit: u64,
    pub source: GasLimitSource,
}

/// Gas parameters for state-changing calls.
#[derive(Debug, Clone)]
pub struct GasPolicy {
    pub price_margin_percent: u64,
    pub estimate_margin_percent: u64,
    pub transfer_limit: u64,
    pub fallback_limit: u64,
}

impl GasPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            price_margin_percent: config.gas_price_margin_percent,
            estimate_margin_percent: config.gas_estimate_margin_percent,
            transfer_limit: config.transfer_gas_limit,
            fallback_limit: config.trade_gas_limit,
        }
    }

    pub fn bump_price(&self, network_price: U256) -> U256 {
        network_price * U256::from(self.price_margin_percent) / U256::from(100u64)
    }

    /// Network gas price with the configured margin applied.
    pub async fn gas_price(&self, wallet: &dyn WalletProvider) -> Result<U256, OtcError> {
        let network = wallet.gas_price().await?;
        Ok(self.bump_price(network))
    }

    pub fn fixed_limit(&self) -> GasLimit {
        GasLimit {
            limit: self.transfer_limit,
            source: GasLimitSource::Fixed,
        }
    }

    /// Estimate with margin, or the fixed ceiling when estimation fails.
    pub async fn estimated_limit(&self, wallet: &dyn WalletProvider, tx: &TxRequest) -> GasLimit {
        match wallet.estimate_gas(tx).await {
            Ok(estimate) => {
                let limit = estimate.saturating_mul(self.estimate_margin_percent) / 100;
                info!("Gas estimate {} -> limit {}", estimate, limit);
                GasLimit {
                    limit,
                    source: GasLimitSource::Estimated { estimate },
                }
            }
            Err(e) => {
                let failure = OtcError::GasEstimationFailed(e.to_string());
                warn!("{}; using fixed limit {}", failure, self.fallback_limit);
                GasLimit {
                    limit: self.fallback_limit,
                    source: GasLimitSource::Fallback { reason: e.to_string() },
                }
            }
        }
    }
}

/// A mined transaction together with the gas limit it was sent with.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub receipt: TxReceipt,
    pub gas: GasLimit,
}

/// Signs, broadcasts and waits for one confirmation. A failed receipt is
/// replayed through eth_call to recover the revert reason.
pub async fn submit(
    wallet: &dyn WalletProvider,
    tx: TxRequest,
    gas: GasLimit,
    gas_price: U256,
) -> Result<Submitted, OtcError> {
    let tx = tx.gas(gas.limit, gas_price);
    let tx_hash = wallet.send_transaction(&tx).await?;
    info!("Transaction submitted: {} (gas limit {})", tx_hash, gas.limit);

    let receipt = wallet.wait_for_receipt(tx_hash).await?;
    if !receipt.success {
        let reason = match wallet.call(&tx).await {
            Err(OtcError::TransactionReverted { reason, .. }) => reason,
            _ => "execution reverted".to_string(),
        };
        return Err(OtcError::TransactionReverted {
            tx_hash: Some(tx_hash),
            reason,
        });
    }

    info!(
        "Transaction confirmed: {} in block {:?}",
        tx_hash, receipt.block_number
    );
    Ok(Submitted { receipt, gas })
}

/// Runs a view call and decodes its return data.
pub(crate) async fn read<C: alloy_sol_types::SolCall>(
    wallet: &dyn WalletProvider,
    to: Address,
    call: C,
) -> Result<C::Return, OtcError> {
    let data = wallet.call(&TxRequest::call(to, call.abi_encode())).await?;
    Ok(C::abi_decode_returns(&data, true)?)
}
