// Balance and allowance reader. Each field is read independently; a field
// that fails keeps its previous value.

use std::fmt::Display;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{debug, warn};

use crate::contracts::TokenProxy;
use crate::error::OtcResult;
use crate::types::Balances;
use crate::wallet::WalletProvider;

pub struct BalanceReader {
    wallet: Arc<dyn WalletProvider>,
    token: TokenProxy,
    stable: TokenProxy,
    escrow: Address,   // spender for the token allowance
    receiver: Address, // spender for the stablecoin allowance
}

impl BalanceReader {
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        token: TokenProxy,
        stable: TokenProxy,
        escrow: Address,
        receiver: Address,
    ) -> Self {
        Self {
            wallet,
            token,
            stable,
            escrow,
            receiver,
        }
    }

    pub async fn refresh(&self, account: Address, previous: &Balances) -> Balances {
        let (token, native, stable, token_allowance, stable_allowance) = tokio::join!(
            self.token.balance_of(account),
            self.wallet.get_balance(account),
            self.stable.balance_of(account),
            self.token.allowance(account, self.escrow),
            self.stable.allowance(account, self.receiver),
        );

        let balances = Balances {
            token: keep_on_error("token balance", token, previous.token),
            native: keep_on_error("native balance", native, previous.native),
            stable: keep_on_error("stable balance", stable, previous.stable),
            token_allowance: keep_on_error("token allowance", token_allowance, previous.token_allowance),
            stable_allowance: keep_on_error("stable allowance", stable_allowance, previous.stable_allowance),
        };
        debug!("Balances refreshed for {}: {:?}", account, balances);
        balances
    }

    /// Fresh native balance, used right before a native purchase.
    pub async fn native_balance(&self, account: Address) -> OtcResult<U256> {
        self.wallet.get_balance(account).await
    }
}

fn keep_on_error<E: Display>(field: &str, read: Result<U256, E>, previous: U256) -> U256 {
    match read {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to read {}: {}; keeping previous value", field, e);
            previous
        }
    }
}
