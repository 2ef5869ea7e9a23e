// Pull-based readers feeding the desk snapshot

pub mod balances;
pub mod ledger;

pub use balances::BalanceReader;
pub use ledger::LedgerReader;
