// Session manager behaviour driven directly, without the desk

mod common;

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok, block_on};

use common::{buyer, owner, tokens, FakeWallet};
use otc_desk::types::Balances;
use otc_desk::wallet::{SessionChange, SessionManager, WalletEvent, WalletProvider};
use otc_desk::OtcError;

fn manager(wallet: &Arc<FakeWallet>) -> SessionManager {
    let provider: Arc<dyn WalletProvider> = wallet.clone();
    SessionManager::new(provider, vec![56, 97], 56)
}

#[test]
fn connect_reads_account_and_chain() {
    let wallet = Arc::new(FakeWallet::new(owner(), 97));
    let sessions = manager(&wallet);

    let session = assert_ok!(block_on(sessions.connect()));
    assert_eq!(session.account, Some(owner()));
    assert_eq!(session.chain_id, Some(97));
    assert!(session.ready_for_trading(&[56, 97]));
}

#[test]
fn empty_account_list_counts_as_rejection() {
    let wallet = Arc::new(FakeWallet::new(owner(), 56));
    wallet.with_chain(|c| c.accounts.clear());
    let sessions = manager(&wallet);

    let err = assert_err!(block_on(sessions.connect()));
    assert_eq!(err, OtcError::UserRejected);
    assert!(!sessions.current().is_connected());
}

#[test]
fn events_map_to_session_changes() {
    let wallet = Arc::new(FakeWallet::new(owner(), 56));
    let sessions = manager(&wallet);
    assert_ok!(block_on(sessions.connect()));

    let same = WalletEvent::AccountsChanged(vec![owner()]);
    assert_eq!(block_on(sessions.handle_event(&same)), SessionChange::Unchanged);

    let switched = WalletEvent::AccountsChanged(vec![buyer()]);
    assert_eq!(block_on(sessions.handle_event(&switched)), SessionChange::AccountSwitched(buyer()));
    assert_eq!(sessions.current().chain_id, Some(56));

    let unsupported = WalletEvent::ChainChanged(137);
    assert_eq!(block_on(sessions.handle_event(&unsupported)), SessionChange::ChainUnsupported(137));
    assert!(sessions.current().is_connected());
    assert!(!sessions.current().ready_for_trading(sessions.accepted_chains()));

    let back = WalletEvent::ChainChanged(97);
    assert_eq!(block_on(sessions.handle_event(&back)), SessionChange::ChainReload(97));

    assert_eq!(block_on(sessions.handle_event(&WalletEvent::Disconnected)), SessionChange::Disconnected);
    assert_eq!(*sessions.current(), Default::default());
}

#[test]
fn balances_for_a_previous_account_are_dropped() {
    let wallet = Arc::new(FakeWallet::new(owner(), 56));
    let sessions = manager(&wallet);
    assert_ok!(block_on(sessions.connect()));

    let stale = Balances {
        token: tokens("5"),
        ..Default::default()
    };
    assert!(!sessions.apply_balances(buyer(), stale.clone()));
    assert_eq!(sessions.current().balances, Balances::default());

    assert!(sessions.apply_balances(owner(), stale.clone()));
    assert_eq!(sessions.current().balances, stale);
}

#[test]
fn sessions_are_replaced_not_mutated() {
    let wallet = Arc::new(FakeWallet::new(owner(), 56));
    let sessions = manager(&wallet);
    let before = assert_ok!(block_on(sessions.connect()));

    block_on(sessions.handle_event(&WalletEvent::ChainChanged(97)));
    assert_eq!(before.chain_id, Some(56));
    assert_eq!(sessions.current().chain_id, Some(97));
}
