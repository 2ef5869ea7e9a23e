// Composition root: wires wallet, proxies, readers and dispatcher, and keeps
// the snapshot the view renders from.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::contracts::{EscrowProxy, GasPolicy, TokenProxy};
use crate::dispatcher::{Action, ActionDispatcher, ActionReport, RefreshScope};
use crate::error::{OtcError, OtcResult};
use crate::readers::{BalanceReader, LedgerReader};
use crate::storage::{load_rates, RateStore};
use crate::types::{ExchangeRates, Session, Trade};
use crate::wallet::{SessionChange, SessionManager, WalletEvent, WalletProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub at: DateTime<Local>,
}

impl Notice {
    fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            at: Local::now(),
        }
    }
}

/// Everything the view needs, replaced as a whole on every change.
#[derive(Debug, Clone, Default)]
pub struct DeskSnapshot {
    pub session: Arc<Session>,
    pub trades: Vec<Trade>,
    pub rates: ExchangeRates,
    pub busy: bool,
    pub notice: Option<Notice>,
    pub ledger_error: Option<String>, // last failed ledger load; trades shown are older
}

pub struct OtcDesk {
    config: Config,
    wallet: Arc<dyn WalletProvider>,
    session: SessionManager,
    balances: Arc<BalanceReader>,
    ledger: LedgerReader,
    escrow: EscrowProxy,
    dispatcher: ActionDispatcher,
    state: watch::Sender<DeskSnapshot>,
}

impl OtcDesk {
    pub async fn new(config: Config, wallet: Arc<dyn WalletProvider>, rates: Arc<dyn RateStore>) -> anyhow::Result<Arc<Self>> {
        let gas = GasPolicy::from_config(&config);
        let token = TokenProxy::new(wallet.clone(), config.token_address, config.token_symbol.clone(), gas.clone());
        let stable = TokenProxy::new(wallet.clone(), config.stable_address, config.stable_symbol.clone(), gas.clone());
        let escrow = EscrowProxy::new(wallet.clone(), config.escrow_address, gas);

        let balances = Arc::new(BalanceReader::new(
            wallet.clone(),
            token.clone(),
            stable.clone(),
            config.escrow_address,
            config.receiver_address,
        ));
        let ledger = LedgerReader::new(escrow.clone());
        let dispatcher = ActionDispatcher::new(
            &config,
            wallet.clone(),
            token,
            stable,
            escrow.clone(),
            balances.clone(),
            rates.clone(),
        )?;
        let session = SessionManager::new(wallet.clone(), config.accepted_chains.clone(), config.primary_chain());

        let stored_rates = load_rates(rates.as_ref()).await?;
        let (state, _) = watch::channel(DeskSnapshot {
            rates: stored_rates,
            ..Default::default()
        });

        info!(
            "Desk ready: token {}, escrow {}, receiver {}",
            config.token_address, config.escrow_address, config.receiver_address
        );

        Ok(Arc::new(Self {
            config,
            wallet,
            session,
            balances,
            ledger,
            escrow,
            dispatcher,
            state,
        }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> DeskSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DeskSnapshot> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.current()
    }

    fn sync_session(&self) {
        let session = self.session.current();
        self.state.send_modify(|snapshot| snapshot.session = session);
    }

    pub fn set_notice(&self, level: NoticeLevel, text: impl Into<String>) {
        let notice = Notice::new(level, text);
        self.state.send_modify(|snapshot| snapshot.notice = Some(notice));
    }

    fn report_error(&self, context: &str, e: &OtcError) {
        let level = match e {
            OtcError::UserRejected | OtcError::Busy => NoticeLevel::Warning,
            _ => NoticeLevel::Error,
        };
        error!("{} failed: {}", context, e);
        self.set_notice(level, format!("{} failed: {}", context, e));
    }

    pub async fn connect(&self) -> OtcResult<()> {
        match self.session.connect().await {
            Ok(session) => {
                self.sync_session();
                if session.ready_for_trading(self.session.accepted_chains()) {
                    self.check_escrow_token().await;
                    self.refresh().await;
                    self.set_notice(NoticeLevel::Success, "Wallet connected");
                } else if let Some(chain_id) = session.chain_id {
                    self.set_notice(NoticeLevel::Warning, OtcError::UnsupportedNetwork(chain_id).to_string());
                }
                Ok(())
            }
            Err(e) => {
                self.report_error("Connect", &e);
                Err(e)
            }
        }
    }

    async fn check_escrow_token(&self) {
        match self.escrow.token_address().await {
            Ok(token) if token != self.config.token_address => warn!(
                "Escrow {} trades token {}, configured token is {}",
                self.escrow.address(),
                token,
                self.config.token_address
            ),
            Ok(_) => {}
            Err(e) => warn!("Could not read escrow token: {}", e),
        }
    }

    pub async fn switch_network(&self) -> OtcResult<u64> {
        match self.session.switch_to_supported_chain().await {
            Ok(chain_id) => {
                self.sync_session();
                self.refresh().await;
                self.set_notice(NoticeLevel::Success, format!("Switched to chain {}", chain_id));
                Ok(chain_id)
            }
            Err(e) => {
                self.report_error("Network switch", &e);
                Err(e)
            }
        }
    }

    /// Re-reads balances and the ledger for the current session.
    pub async fn refresh(&self) {
        self.refresh_balances().await;
        self.refresh_ledger().await;
    }

    pub async fn refresh_balances(&self) {
        let session = self.session.current();
        let Some(account) = session.account else {
            return;
        };
        if !session.network_supported(self.session.accepted_chains()) {
            return;
        }
        let balances = self.balances.refresh(account, &session.balances).await;
        if self.session.apply_balances(account, balances) {
            self.sync_session();
        }
    }

    pub async fn refresh_ledger(&self) {
        let session = self.session.current();
        if !session.ready_for_trading(self.session.accepted_chains()) {
            return;
        }
        match self.ledger.load_all().await {
            Ok(trades) => self.state.send_modify(|snapshot| {
                snapshot.trades = trades;
                snapshot.ledger_error = None;
            }),
            Err(e) => {
                warn!("Trade ledger refresh failed, keeping previous list: {}", e);
                let message = e.to_string();
                self.state.send_modify(|snapshot| snapshot.ledger_error = Some(message));
            }
        }
    }

    /// Trades from the last ledger load. The ledger is never read on an
    /// unsupported chain, so an empty list there would be misleading.
    pub fn trades(&self) -> OtcResult<Vec<Trade>> {
        let snapshot = self.snapshot();
        let session = &snapshot.session;
        if !session.is_connected() {
            return Err(OtcError::NotConnected);
        }
        if !session.network_supported(self.session.accepted_chains()) {
            return Err(OtcError::UnsupportedNetwork(session.chain_id.unwrap_or_default()));
        }
        Ok(snapshot.trades)
    }

    pub async fn handle_wallet_event(&self, event: WalletEvent) {
        match self.session.handle_event(&event).await {
            SessionChange::Unchanged => {}
            SessionChange::Disconnected => {
                let rates = self.snapshot().rates;
                self.state.send_modify(|snapshot| {
                    *snapshot = DeskSnapshot {
                        rates,
                        busy: snapshot.busy,
                        ..Default::default()
                    }
                });
                self.set_notice(NoticeLevel::Warning, "Wallet disconnected");
            }
            SessionChange::AccountSwitched(_) | SessionChange::ChainReload(_) => {
                self.state.send_modify(|snapshot| snapshot.trades.clear());
                self.sync_session();
                self.refresh().await;
            }
            SessionChange::ChainUnsupported(chain_id) => {
                self.sync_session();
                self.set_notice(NoticeLevel::Warning, OtcError::UnsupportedNetwork(chain_id).to_string());
            }
        }
    }

    /// Runs one user action against the current session and applies its
    /// follow-up refresh. Failures are logged and left in the notice.
    pub async fn perform(&self, action: Action) -> OtcResult<ActionReport> {
        let name = action.name();
        let session = self.session.current();
        let rates = self.snapshot().rates;

        self.state.send_modify(|snapshot| snapshot.busy = true);
        let outcome = self.dispatcher.dispatch(action, &session, &rates).await;
        let still_busy = self.dispatcher.is_busy();
        self.state.send_modify(|snapshot| snapshot.busy = still_busy);

        match outcome {
            Ok(report) => {
                info!("{} succeeded: {}", name, report.message);
                if let Some(rates) = report.rates {
                    self.state.send_modify(|snapshot| snapshot.rates = rates);
                }
                match report.refresh {
                    RefreshScope::Nothing => {}
                    RefreshScope::Balances => self.refresh_balances().await,
                    RefreshScope::BalancesAndLedger => self.refresh().await,
                }
                self.set_notice(NoticeLevel::Success, report.message.clone());
                Ok(report)
            }
            Err(e) => {
                self.report_error(name, &e);
                Err(e)
            }
        }
    }

    /// Applies wallet notifications as they arrive, including mid-action.
    pub fn spawn_event_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let desk = Arc::clone(self);
        let mut events = self.wallet.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => desk.handle_wallet_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} wallet events, reloading session", skipped);
                        desk.refresh().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
