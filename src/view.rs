// Render model: turns a desk snapshot plus the user's form input into what
// the terminal shows. No IO here.

use crate::config::Config;
use crate::desk::{DeskSnapshot, Notice};
use crate::dispatcher::quote_payment;
use crate::types::{
    format_amount, format_fixed, parse_address, parse_positive_amount, short_address, PaymentMethod, Role, Trade,
    TradeStatus,
};

/// Text the user has typed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub buyer_address: String,
    pub amount: String,
    pub native_rate_input: String,
    pub stable_rate_input: String,
    pub other_payment_info: String,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Disconnected,
    WrongNetwork(u64),
    Ready { chain_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub account: Option<String>,
    pub connection: Connection,
    pub balances: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerPanel {
    pub token_allowance: String,
    pub native_rate: String,
    pub stable_rate: String,
    pub buyer_valid: bool,
    pub amount_valid: bool,
    pub needs_approval: bool, // amount exceeds the escrow allowance
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyerPanel {
    pub method: PaymentMethod,
    pub method_label: String,
    pub estimate: Option<String>,
    pub stable_allowance: String,
    pub can_buy: bool,
}

/// Chosen once per render from the connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Panel {
    Owner(OwnerPanel),
    Buyer(BuyerPanel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRow {
    pub id: u64,
    pub seller: String,
    pub buyer: String,
    pub amount: String,
    pub status: TradeStatus,
    pub can_act: bool, // release and cancel offered
}

#[derive(Debug, Clone)]
pub struct View {
    pub header: Header,
    pub panel: Panel,
    pub trades: Vec<TradeRow>,
    pub busy: bool,
    pub notice: Option<Notice>,
    pub ledger_error: Option<String>,
}

pub fn build_view(snapshot: &DeskSnapshot, form: &FormState, config: &Config) -> View {
    let session = &snapshot.session;

    let connection = match (session.account, session.chain_id) {
        (None, _) => Connection::Disconnected,
        (Some(_), Some(chain_id)) if config.accepted_chains.contains(&chain_id) => Connection::Ready { chain_id },
        (Some(_), chain_id) => Connection::WrongNetwork(chain_id.unwrap_or_default()),
    };

    let balances = if session.is_connected() {
        let b = &session.balances;
        vec![
            (config.token_symbol.clone(), format_amount(b.token)),
            (config.native_symbol.clone(), format_amount(b.native)),
            (config.stable_symbol.clone(), format_amount(b.stable)),
        ]
    } else {
        Vec::new()
    };

    let header = Header {
        account: session.account.as_ref().map(short_address),
        connection,
        balances,
    };

    let panel = match session.role(config.receiver_address) {
        Role::Owner => Panel::Owner(owner_panel(snapshot, form)),
        Role::Buyer => Panel::Buyer(buyer_panel(snapshot, form, config)),
    };

    let trades = snapshot
        .trades
        .iter()
        .map(|trade| trade_row(trade, snapshot))
        .collect();

    View {
        header,
        panel,
        trades,
        busy: snapshot.busy,
        notice: snapshot.notice.clone(),
        ledger_error: snapshot.ledger_error.clone(),
    }
}

fn owner_panel(snapshot: &DeskSnapshot, form: &FormState) -> OwnerPanel {
    let balances = &snapshot.session.balances;
    let amount = parse_positive_amount(&form.amount).ok();
    OwnerPanel {
        token_allowance: format_amount(balances.token_allowance),
        native_rate: format_amount(snapshot.rates.native),
        stable_rate: format_amount(snapshot.rates.stable),
        buyer_valid: parse_address(&form.buyer_address).is_ok(),
        amount_valid: amount.is_some(),
        needs_approval: amount.map(|a| a > balances.token_allowance).unwrap_or(false),
    }
}

fn buyer_panel(snapshot: &DeskSnapshot, form: &FormState, config: &Config) -> BuyerPanel {
    let amount = parse_positive_amount(&form.amount).ok();
    let rate = snapshot.rates.rate_for(form.payment_method);

    let (method_label, estimate) = match form.payment_method {
        PaymentMethod::Native => (
            config.native_symbol.clone(),
            estimate_text(amount, rate, 8, &config.native_symbol),
        ),
        PaymentMethod::Stable => (
            config.stable_symbol.clone(),
            estimate_text(amount, rate, 2, &config.stable_symbol),
        ),
        PaymentMethod::Other => ("Other".to_string(), None),
    };

    let can_buy = amount.is_some()
        && match form.payment_method {
            PaymentMethod::Other => !form.other_payment_info.trim().is_empty(),
            method => snapshot.rates.rate_for(method).is_some(),
        };

    BuyerPanel {
        method: form.payment_method,
        method_label,
        estimate,
        stable_allowance: format_amount(snapshot.session.balances.stable_allowance),
        can_buy,
    }
}

fn estimate_text(
    amount: Option<alloy_primitives::U256>,
    rate: Option<alloy_primitives::U256>,
    places: u8,
    symbol: &str,
) -> Option<String> {
    let amount = amount?;
    match rate.map(|rate| quote_payment(amount, rate)) {
        Some(Ok(Some(payment))) => Some(format!("{} {}", format_fixed(payment, places), symbol)),
        Some(Err(_)) => Some("amount too large".to_string()),
        _ => Some("rate not set".to_string()),
    }
}

fn trade_row(trade: &Trade, snapshot: &DeskSnapshot) -> TradeRow {
    TradeRow {
        id: trade.id,
        seller: short_address(&trade.seller),
        buyer: short_address(&trade.buyer),
        amount: format_amount(trade.amount),
        status: trade.status,
        can_act: trade.is_open() && trade.is_seller(snapshot.session.account),
    }
}
