// Wallet session lifecycle: connect, react to provider events, switch chains.
// The current Session lives behind a watch channel and is swapped wholesale.

use std::sync::Arc;

use alloy_primitives::Address;
use tokio::sync::watch;
use tracing::{info, warn};

use super::{WalletEvent, WalletProvider};
use crate::config::ChainParams;
use crate::error::{OtcError, OtcResult};
use crate::types::{short_address, Balances, Session};

/// What a wallet event did to the session, so the desk knows how much to reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Unchanged,
    Disconnected,
    AccountSwitched(Address),
    ChainUnsupported(u64),
    ChainReload(u64),
}

pub struct SessionManager {
    wallet: Arc<dyn WalletProvider>,
    accepted_chains: Vec<u64>,
    primary_chain: u64,
    current: watch::Sender<Arc<Session>>,
}

impl SessionManager {
    pub fn new(wallet: Arc<dyn WalletProvider>, accepted_chains: Vec<u64>, primary_chain: u64) -> Self {
        let (current, _) = watch::channel(Arc::new(Session::default()));
        Self {
            wallet,
            accepted_chains,
            primary_chain,
            current,
        }
    }

    pub fn current(&self) -> Arc<Session> {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<Session>> {
        self.current.subscribe()
    }

    pub fn accepted_chains(&self) -> &[u64] {
        &self.accepted_chains
    }

    fn replace(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.current.send_replace(session.clone());
        session
    }

    pub async fn connect(&self) -> OtcResult<Arc<Session>> {
        let accounts = self.wallet.request_accounts().await?;
        let account = accounts.first().copied().ok_or(OtcError::UserRejected)?;
        let chain_id = self.wallet.chain_id().await?;

        if !self.accepted_chains.contains(&chain_id) {
            warn!(
                "Connected on unsupported chain {}; writes are blocked until the network is switched",
                chain_id
            );
        }
        info!("Wallet connected: {} on chain {}", short_address(&account), chain_id);
        Ok(self.replace(Session::connected(account, chain_id)))
    }

    pub fn disconnect(&self) {
        self.replace(Session::default());
    }

    pub async fn handle_event(&self, event: &WalletEvent) -> SessionChange {
        let previous = self.current();
        match event {
            WalletEvent::Disconnected => {
                warn!("Wallet provider disconnected, session reset");
                self.disconnect();
                SessionChange::Disconnected
            }
            WalletEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    info!("Wallet reported no accounts, session reset");
                    self.disconnect();
                    SessionChange::Disconnected
                }
                Some(account) if previous.account == Some(*account) => SessionChange::Unchanged,
                Some(account) => {
                    let chain_id = match previous.chain_id {
                        Some(id) => Some(id),
                        None => self.wallet.chain_id().await.ok(),
                    };
                    info!("Account switched to {}", short_address(account));
                    self.replace(Session {
                        account: Some(*account),
                        chain_id,
                        balances: Balances::default(),
                    });
                    SessionChange::AccountSwitched(*account)
                }
            },
            WalletEvent::ChainChanged(chain_id) => {
                self.replace(previous.with_chain(*chain_id));
                if self.accepted_chains.contains(chain_id) {
                    info!("Chain changed to {}, reloading", chain_id);
                    SessionChange::ChainReload(*chain_id)
                } else {
                    warn!("Chain changed to unsupported id {}; please switch to BNB Smart Chain", chain_id);
                    SessionChange::ChainUnsupported(*chain_id)
                }
            }
        }
    }

    /// Installs fresh balances, unless the account changed while they were read.
    pub fn apply_balances(&self, account: Address, balances: Balances) -> bool {
        self.current.send_if_modified(|slot| {
            if slot.account != Some(account) {
                return false;
            }
            *slot = Arc::new(slot.with_balances(balances));
            true
        })
    }

    /// Asks the wallet to move to the primary chain, registering the chain
    /// first if the wallet does not know it.
    pub async fn switch_to_supported_chain(&self) -> OtcResult<u64> {
        let target = self.primary_chain;
        match self.wallet.switch_chain(target).await {
            Ok(()) => {}
            Err(e) if e.is_unrecognized_chain() => {
                info!("Wallet does not know chain {}, adding it", target);
                self.wallet.add_chain(&ChainParams::for_chain(target)).await?;
            }
            Err(e) => return Err(e),
        }

        let chain_id = self.wallet.chain_id().await?;
        self.replace(self.current().with_chain(chain_id));
        info!("Wallet now on chain {}", chain_id);
        Ok(chain_id)
    }
}
