// Escrow proxy: trade ledger reads and trade lifecycle writes

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::{SolCall, SolEvent};
use tracing::warn;

use super::{read, submit, GasPolicy, IOtcEscrow, Submitted};
use crate::error::{OtcError, OtcResult};
use crate::types::Trade;
use crate::wallet::{TxReceipt, TxRequest, WalletProvider};

#[derive(Clone)]
pub struct EscrowProxy {
    wallet: Arc<dyn WalletProvider>,
    address: Address,
    gas: GasPolicy,
}

impl EscrowProxy {
    pub fn new(wallet: Arc<dyn WalletProvider>, address: Address, gas: GasPolicy) -> Self {
        Self { wallet, address, gas }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Token the escrow was deployed against.
    pub async fn token_address(&self) -> OtcResult<Address> {
        let ret = read(self.wallet.as_ref(), self.address, IOtcEscrow::tjcdTokenCall {}).await?;
        Ok(ret._0)
    }

    pub async fn trade_counter(&self) -> OtcResult<u64> {
        let ret = read(self.wallet.as_ref(), self.address, IOtcEscrow::tradeCounterCall {}).await?;
        u64::try_from(ret._0).map_err(|_| OtcError::Decode(format!("trade counter {} out of range", ret._0)))
    }

    /// Record at `index`; the ledger uses the index as the trade id.
    pub async fn trade(&self, index: u64) -> OtcResult<Trade> {
        let record = read(
            self.wallet.as_ref(),
            self.address,
            IOtcEscrow::tradesCall { index: U256::from(index) },
        )
        .await?;

        if record.tradeId != U256::from(index) {
            warn!("Trade at index {} reports tradeId {}", index, record.tradeId);
        }

        Trade::from_flags(
            index,
            record.seller,
            record.buyer,
            record.amount,
            record.isReleased,
            record.isCancelled,
        )
    }

    pub async fn create_trade(&self, from: Address, buyer: Address, amount: U256) -> OtcResult<(Submitted, Option<u64>)> {
        let data = IOtcEscrow::createTradeCall { buyer, amount }.abi_encode();
        let submitted = self.send(from, data).await?;
        let trade_id = created_trade_id(&submitted.receipt, self.address);
        Ok((submitted, trade_id))
    }

    pub async fn release_trade(&self, from: Address, trade_id: u64) -> OtcResult<Submitted> {
        let data = IOtcEscrow::releaseTradeCall { tradeId: U256::from(trade_id) }.abi_encode();
        self.send(from, data).await
    }

    pub async fn cancel_trade(&self, from: Address, trade_id: u64) -> OtcResult<Submitted> {
        let data = IOtcEscrow::cancelTradeCall { tradeId: U256::from(trade_id) }.abi_encode();
        self.send(from, data).await
    }

    pub async fn resolve_dispute(&self, from: Address, trade_id: u64, recipient: Address) -> OtcResult<Submitted> {
        let data = IOtcEscrow::resolveDisputeCall {
            tradeId: U256::from(trade_id),
            recipient,
        }
        .abi_encode();
        self.send(from, data).await
    }

    async fn send(&self, from: Address, data: Vec<u8>) -> OtcResult<Submitted> {
        let wallet = self.wallet.as_ref();
        let gas_price = self.gas.gas_price(wallet).await?;
        let tx = TxRequest::call(self.address, data).from(from);
        let limit = self.gas.estimated_limit(wallet, &tx).await;
        submit(wallet, tx, limit, gas_price).await
    }
}

/// Trade id from the TradeCreated log emitted by `escrow`, if present.
pub fn created_trade_id(receipt: &TxReceipt, escrow: Address) -> Option<u64> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == escrow)
        .find(|log| log.topics.first() == Some(&IOtcEscrow::TradeCreated::SIGNATURE_HASH))
        .and_then(|log| log.topics.get(1))
        .and_then(|topic| u64::try_from(U256::from_be_bytes(topic.0)).ok())
}
