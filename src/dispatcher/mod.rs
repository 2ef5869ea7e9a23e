// Action dispatcher: local validation, session gates, submission, report.
// One action runs at a time; the busy flag is held for the whole round trip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use tracing::info;

use crate::config::Config;
use crate::contracts::{EscrowProxy, GasLimit, GasPolicy, Submitted, TokenProxy};
use crate::error::{OtcError, OtcResult};
use crate::readers::BalanceReader;
use crate::storage::{save_rates, RateStore};
use crate::types::{
    format_amount, parse_address, parse_amount, parse_positive_amount, short_address, ExchangeRates, Role,
    Session, Trade,
};
use crate::wallet::WalletProvider;

pub mod purchase;

pub use purchase::{off_platform_instructions, quote_payment};

/// Write actions a user can trigger. Inputs stay as typed text until validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ApproveToken,
    ApproveStable,
    CreateTrade { buyer: String, amount: String },
    ReleaseTrade(Trade),
    CancelTrade(Trade),
    ResolveDispute { trade_id: u64, recipient: String },
    BuyWithNative { amount: String },
    BuyWithStable { amount: String },
    BuyOffPlatform { amount: String, method_info: String },
    DirectTransfer { recipient: String, amount: String },
    SetExchangeRates { native: String, stable: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ApproveToken => "approve token",
            Action::ApproveStable => "approve stablecoin",
            Action::CreateTrade { .. } => "create trade",
            Action::ReleaseTrade(_) => "release trade",
            Action::CancelTrade(_) => "cancel trade",
            Action::ResolveDispute { .. } => "resolve dispute",
            Action::BuyWithNative { .. } => "buy with native coin",
            Action::BuyWithStable { .. } => "buy with stablecoin",
            Action::BuyOffPlatform { .. } => "buy off-platform",
            Action::DirectTransfer { .. } => "direct transfer",
            Action::SetExchangeRates { .. } => "set exchange rates",
        }
    }
}

/// How much the desk should re-read after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    Nothing,
    Balances,
    BalancesAndLedger,
}

#[derive(Debug, Clone)]
pub struct ActionReport {
    pub action: &'static str,
    pub tx_hash: Option<B256>,
    pub gas: Option<GasLimit>,
    pub trade_id: Option<u64>,
    pub rates: Option<ExchangeRates>,
    pub message: String,
    pub refresh: RefreshScope,
}

impl ActionReport {
    fn new(action: &'static str, message: impl Into<String>, refresh: RefreshScope) -> Self {
        Self {
            action,
            tx_hash: None,
            gas: None,
            trade_id: None,
            rates: None,
            message: message.into(),
            refresh,
        }
    }

    fn submitted(action: &'static str, submitted: Submitted, message: impl Into<String>, refresh: RefreshScope) -> Self {
        Self {
            tx_hash: Some(submitted.receipt.transaction_hash),
            gas: Some(submitted.gas),
            ..Self::new(action, message, refresh)
        }
    }
}

struct Symbols {
    token: String,
    native: String,
    stable: String,
}

pub struct ActionDispatcher {
    wallet: Arc<dyn WalletProvider>,
    token: TokenProxy,
    stable: TokenProxy,
    escrow: EscrowProxy,
    balances: Arc<BalanceReader>,
    rates: Arc<dyn RateStore>,
    gas: GasPolicy,
    owner: Address,
    accepted_chains: Vec<u64>,
    approval_amount: U256,
    symbols: Symbols,
    busy: AtomicBool,
}

/// Clears the busy flag when the action finishes, however it finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ActionDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        wallet: Arc<dyn WalletProvider>,
        token: TokenProxy,
        stable: TokenProxy,
        escrow: EscrowProxy,
        balances: Arc<BalanceReader>,
        rates: Arc<dyn RateStore>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            wallet,
            token,
            stable,
            escrow,
            balances,
            rates,
            gas: GasPolicy::from_config(config),
            owner: config.receiver_address,
            accepted_chains: config.accepted_chains.clone(),
            approval_amount: config.approval_amount()?,
            symbols: Symbols {
                token: config.token_symbol.clone(),
                native: config.native_symbol.clone(),
                stable: config.stable_symbol.clone(),
            },
            busy: AtomicBool::new(false),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> OtcResult<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| OtcError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    /// Connected account on an accepted chain.
    fn ready_account(&self, session: &Session) -> OtcResult<Address> {
        let account = session.account.ok_or(OtcError::NotConnected)?;
        match session.chain_id {
            Some(chain_id) if self.accepted_chains.contains(&chain_id) => Ok(account),
            Some(chain_id) => Err(OtcError::UnsupportedNetwork(chain_id)),
            None => Err(OtcError::UnsupportedNetwork(0)),
        }
    }

    fn owner_account(&self, session: &Session, what: &'static str) -> OtcResult<Address> {
        let account = self.ready_account(session)?;
        if session.role(self.owner) != Role::Owner {
            return Err(OtcError::NotOwner(what));
        }
        Ok(account)
    }

    pub async fn dispatch(&self, action: Action, session: &Session, rates: &ExchangeRates) -> OtcResult<ActionReport> {
        let _guard = self.acquire()?;
        info!("Dispatching action: {}", action.name());

        match action {
            Action::ApproveToken => self.approve_token(session).await,
            Action::ApproveStable => self.approve_stable(session).await,
            Action::CreateTrade { buyer, amount } => self.create_trade(session, &buyer, &amount).await,
            Action::ReleaseTrade(trade) => self.release_trade(session, &trade).await,
            Action::CancelTrade(trade) => self.cancel_trade(session, &trade).await,
            Action::ResolveDispute { trade_id, recipient } => {
                self.resolve_dispute(session, trade_id, &recipient).await
            }
            Action::BuyWithNative { amount } => self.buy_with_native(session, rates, &amount).await,
            Action::BuyWithStable { amount } => self.buy_with_stable(session, rates, &amount).await,
            Action::BuyOffPlatform { amount, method_info } => {
                self.buy_off_platform(session, &amount, &method_info)
            }
            Action::DirectTransfer { recipient, amount } => {
                self.direct_transfer(session, &recipient, &amount).await
            }
            Action::SetExchangeRates { native, stable } => {
                self.set_exchange_rates(session, &native, &stable).await
            }
        }
    }

    async fn approve_token(&self, session: &Session) -> OtcResult<ActionReport> {
        let account = self.ready_account(session)?;
        let submitted = self
            .token
            .approve(account, self.escrow.address(), self.approval_amount)
            .await?;
        Ok(ActionReport::submitted(
            "approve token",
            submitted,
            format!(
                "Approved {} {} to the escrow",
                format_amount(self.approval_amount),
                self.symbols.token
            ),
            RefreshScope::Balances,
        ))
    }

    async fn approve_stable(&self, session: &Session) -> OtcResult<ActionReport> {
        let account = self.ready_account(session)?;
        let submitted = self.stable.approve(account, self.owner, self.approval_amount).await?;
        Ok(ActionReport::submitted(
            "approve stablecoin",
            submitted,
            format!(
                "Approved {} {} to the receiver",
                format_amount(self.approval_amount),
                self.symbols.stable
            ),
            RefreshScope::Balances,
        ))
    }

    async fn create_trade(&self, session: &Session, buyer: &str, amount: &str) -> OtcResult<ActionReport> {
        let buyer = parse_address(buyer)?;
        let amount = parse_positive_amount(amount)?;
        let account = self.ready_account(session)?;

        let balances = &session.balances;
        if balances.token_allowance < amount {
            return Err(OtcError::InsufficientAllowance {
                asset: self.symbols.token.clone(),
                required: format_amount(amount),
                approved: format_amount(balances.token_allowance),
            });
        }
        if balances.token < amount {
            return Err(OtcError::InsufficientBalance {
                asset: self.symbols.token.clone(),
                required: format_amount(amount),
                available: format_amount(balances.token),
            });
        }

        let (submitted, trade_id) = self.escrow.create_trade(account, buyer, amount).await?;
        let message = match trade_id {
            Some(id) => format!(
                "Trade #{} created: {} {} for {}",
                id,
                format_amount(amount),
                self.symbols.token,
                short_address(&buyer)
            ),
            None => format!("Trade created for {}", short_address(&buyer)),
        };
        let mut report = ActionReport::submitted("create trade", submitted, message, RefreshScope::BalancesAndLedger);
        report.trade_id = trade_id;
        Ok(report)
    }

    fn check_seller_action(&self, session: &Session, trade: &Trade, action: &'static str) -> OtcResult<Address> {
        let account = self.ready_account(session)?;
        if !trade.is_open() {
            return Err(OtcError::TradeUnavailable {
                id: trade.id,
                action,
                reason: "it is no longer open",
            });
        }
        if !trade.is_seller(Some(account)) {
            return Err(OtcError::TradeUnavailable {
                id: trade.id,
                action,
                reason: "only its seller can do that",
            });
        }
        Ok(account)
    }

    async fn release_trade(&self, session: &Session, trade: &Trade) -> OtcResult<ActionReport> {
        let account = self.check_seller_action(session, trade, "released")?;
        let submitted = self.escrow.release_trade(account, trade.id).await?;
        Ok(ActionReport::submitted(
            "release trade",
            submitted,
            format!("Trade #{} released", trade.id),
            RefreshScope::BalancesAndLedger,
        ))
    }

    async fn cancel_trade(&self, session: &Session, trade: &Trade) -> OtcResult<ActionReport> {
        let account = self.check_seller_action(session, trade, "cancelled")?;
        let submitted = self.escrow.cancel_trade(account, trade.id).await?;
        Ok(ActionReport::submitted(
            "cancel trade",
            submitted,
            format!("Trade #{} cancelled", trade.id),
            RefreshScope::BalancesAndLedger,
        ))
    }

    async fn resolve_dispute(&self, session: &Session, trade_id: u64, recipient: &str) -> OtcResult<ActionReport> {
        let recipient = parse_address(recipient)?;
        let account = self.owner_account(session, "resolve disputes")?;
        let submitted = self.escrow.resolve_dispute(account, trade_id, recipient).await?;
        Ok(ActionReport::submitted(
            "resolve dispute",
            submitted,
            format!("Trade #{} resolved in favour of {}", trade_id, short_address(&recipient)),
            RefreshScope::BalancesAndLedger,
        ))
    }

    async fn direct_transfer(&self, session: &Session, recipient: &str, amount: &str) -> OtcResult<ActionReport> {
        let recipient = parse_address(recipient)?;
        let amount = parse_positive_amount(amount)?;
        let account = self.owner_account(session, "transfer tokens directly")?;

        if session.balances.token < amount {
            return Err(OtcError::InsufficientBalance {
                asset: self.symbols.token.clone(),
                required: format_amount(amount),
                available: format_amount(session.balances.token),
            });
        }

        let submitted = self.token.transfer(account, recipient, amount).await?;
        Ok(ActionReport::submitted(
            "direct transfer",
            submitted,
            format!(
                "Sent {} {} to {}",
                format_amount(amount),
                self.symbols.token,
                short_address(&recipient)
            ),
            RefreshScope::Balances,
        ))
    }

    async fn set_exchange_rates(&self, session: &Session, native: &str, stable: &str) -> OtcResult<ActionReport> {
        let rates = ExchangeRates {
            native: parse_amount(native)?,
            stable: parse_amount(stable)?,
        };
        if session.role(self.owner) != Role::Owner {
            return Err(OtcError::NotOwner("set exchange rates"));
        }

        save_rates(self.rates.as_ref(), &rates)
            .await
            .map_err(|e| OtcError::Storage(e.to_string()))?;

        let mut report = ActionReport::new(
            "set exchange rates",
            format!(
                "Rates saved: 1 {} = {} {} / {} {}",
                self.symbols.token,
                format_amount(rates.native),
                self.symbols.native,
                format_amount(rates.stable),
                self.symbols.stable
            ),
            RefreshScope::Nothing,
        );
        report.rates = Some(rates);
        Ok(report)
    }
}
