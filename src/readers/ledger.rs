// Trade ledger reader: counter first, then each record in index order

use tracing::info;

use crate::contracts::EscrowProxy;
use crate::error::OtcResult;
use crate::types::Trade;

pub struct LedgerReader {
    escrow: EscrowProxy,
}

impl LedgerReader {
    pub fn new(escrow: EscrowProxy) -> Self {
        Self { escrow }
    }

    /// Any failed read aborts the whole load; callers keep their previous list.
    pub async fn load_all(&self) -> OtcResult<Vec<Trade>> {
        let count = self.escrow.trade_counter().await?;
        // the counter comes from the contract; don't size allocations from it
        let mut trades = Vec::new();
        for index in 0..count {
            trades.push(self.escrow.trade(index).await?);
        }
        info!("Loaded {} trades from escrow", trades.len());
        Ok(trades)
    }
}
