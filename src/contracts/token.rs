// ERC20 proxy, used for both the desk token and the stablecoin

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;

use super::{read, submit, GasPolicy, IERC20, Submitted};
use crate::error::OtcResult;
use crate::wallet::{TxRequest, WalletProvider};

#[derive(Clone)]
pub struct TokenProxy {
    wallet: Arc<dyn WalletProvider>,
    address: Address,
    symbol: String,
    gas: GasPolicy,
}

impl TokenProxy {
    pub fn new(wallet: Arc<dyn WalletProvider>, address: Address, symbol: impl Into<String>, gas: GasPolicy) -> Self {
        Self {
            wallet,
            address,
            symbol: symbol.into(),
            gas,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn balance_of(&self, account: Address) -> OtcResult<U256> {
        let ret = read(self.wallet.as_ref(), self.address, IERC20::balanceOfCall { account }).await?;
        Ok(ret._0)
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> OtcResult<U256> {
        let ret = read(
            self.wallet.as_ref(),
            self.address,
            IERC20::allowanceCall { owner, spender },
        )
        .await?;
        Ok(ret._0)
    }

    pub async fn approve(&self, from: Address, spender: Address, amount: U256) -> OtcResult<Submitted> {
        let data = IERC20::approveCall { spender, amount }.abi_encode();
        self.send(from, data).await
    }

    pub async fn transfer(&self, from: Address, to: Address, amount: U256) -> OtcResult<Submitted> {
        let data = IERC20::transferCall { to, amount }.abi_encode();
        self.send(from, data).await
    }

    async fn send(&self, from: Address, data: Vec<u8>) -> OtcResult<Submitted> {
        let gas_price = self.gas.gas_price(self.wallet.as_ref()).await?;
        let tx = TxRequest::call(self.address, data).from(from);
        submit(self.wallet.as_ref(), tx, self.gas.fixed_limit(), gas_price).await
    }
}
