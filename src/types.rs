// Core types for the OTC desk client

use std::fmt;
use std::str::FromStr;

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{OtcError, OtcResult};

/// Decimals shared by the desk token, the stablecoin and the native coin.
pub const TOKEN_DECIMALS: u8 = 18;

/// Wallet-scoped view of the connected account. Replaced wholesale on every
/// wallet event or refresh, never mutated field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub balances: Balances,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub native: U256,
    pub token: U256,
    pub stable: U256,
    pub token_allowance: U256,  // token approved to the escrow contract
    pub stable_allowance: U256, // stablecoin approved to the receiver
}

impl Session {
    pub fn connected(account: Address, chain_id: u64) -> Self {
        Self {
            account: Some(account),
            chain_id: Some(chain_id),
            balances: Balances::default(),
        }
    }

    pub fn with_balances(&self, balances: Balances) -> Self {
        Self {
            balances,
            ..self.clone()
        }
    }

    pub fn with_chain(&self, chain_id: u64) -> Self {
        Self {
            chain_id: Some(chain_id),
            ..self.clone()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    pub fn role(&self, owner: Address) -> Role {
        match self.account {
            Some(account) if account == owner => Role::Owner,
            _ => Role::Buyer,
        }
    }

    pub fn network_supported(&self, accepted: &[u64]) -> bool {
        self.chain_id.map(|id| accepted.contains(&id)).unwrap_or(false)
    }

    pub fn ready_for_trading(&self, accepted: &[u64]) -> bool {
        self.is_connected() && self.network_supported(accepted)
    }
}

/// Derived from the connected account; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Buyer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Released,
    Cancelled,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "Open"),
            TradeStatus::Released => write!(f, "Released"),
            TradeStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Read-only mirror of an escrow trade record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trade {
    pub id: u64,
    pub seller: Address,
    pub buyer: Address,
    pub amount: U256,
    pub status: TradeStatus,
}

impl Trade {
    /// Builds a trade from the escrow's two status flags. A record claiming
    /// to be both released and cancelled is rejected.
    pub fn from_flags(
        id: u64,
        seller: Address,
        buyer: Address,
        amount: U256,
        released: bool,
        cancelled: bool,
    ) -> OtcResult<Self> {
        let status = match (released, cancelled) {
            (false, false) => TradeStatus::Open,
            (true, false) => TradeStatus::Released,
            (false, true) => TradeStatus::Cancelled,
            (true, true) => {
                return Err(OtcError::Decode(format!(
                    "trade {} is marked both released and cancelled",
                    id
                )))
            }
        };
        Ok(Self { id, seller, buyer, amount, status })
    }

    pub fn released(&self) -> bool {
        self.status == TradeStatus::Released
    }

    pub fn cancelled(&self) -> bool {
        self.status == TradeStatus::Cancelled
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_seller(&self, account: Option<Address>) -> bool {
        account == Some(self.seller)
    }
}

/// Advisory per-token prices, 18-decimal fixed point. Zero means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeRates {
    pub native: U256,
    pub stable: U256,
}

impl ExchangeRates {
    pub fn rate_for(&self, method: PaymentMethod) -> Option<U256> {
        let rate = match method {
            PaymentMethod::Native => self.native,
            PaymentMethod::Stable => self.stable,
            PaymentMethod::Other => return None,
        };
        if rate.is_zero() {
            None
        } else {
            Some(rate)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentMethod {
    #[default]
    Native,
    Stable,
    Other,
}

impl PaymentMethod {
    pub fn next(self) -> Self {
        match self {
            PaymentMethod::Native => PaymentMethod::Stable,
            PaymentMethod::Stable => PaymentMethod::Other,
            PaymentMethod::Other => PaymentMethod::Native,
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "bnb" => Ok(PaymentMethod::Native),
            "stable" | "usdt" => Ok(PaymentMethod::Stable),
            "other" | "offchain" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// Parses a human decimal amount ("10", "0.25") into 18-decimal base units.
pub fn parse_amount(input: &str) -> OtcResult<U256> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
        return Err(OtcError::InvalidAmount(input.to_string()));
    }
    parse_units(trimmed, TOKEN_DECIMALS)
        .map(|units| units.get_absolute())
        .map_err(|_| OtcError::InvalidAmount(input.to_string()))
}

/// Like `parse_amount` but rejects zero.
pub fn parse_positive_amount(input: &str) -> OtcResult<U256> {
    let amount = parse_amount(input)?;
    if amount.is_zero() {
        return Err(OtcError::InvalidAmount(input.to_string()));
    }
    Ok(amount)
}

/// Formats base units as a decimal string without trailing zeros ("0.01").
pub fn format_amount(value: U256) -> String {
    let full = format_units(value, TOKEN_DECIMALS).unwrap_or_else(|_| value.to_string());
    trim_decimal(&full)
}

/// Formats base units rounded half-up to a fixed number of places.
pub fn format_fixed(value: U256, places: u8) -> String {
    let places = places.min(TOKEN_DECIMALS);
    let unit = U256::from(10u64).pow(U256::from(TOKEN_DECIMALS - places));
    let half = unit / U256::from(2u64);
    let rounded = value.saturating_add(half) / unit * unit;
    let full = format_units(rounded, TOKEN_DECIMALS).unwrap_or_else(|_| rounded.to_string());
    match full.split_once('.') {
        Some((int, _)) if places == 0 => int.to_string(),
        Some((int, frac)) => format!("{}.{}", int, &frac[..places as usize]),
        None => full,
    }
}

fn trim_decimal(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Validates a 0x-prefixed address. Mixed-case input must carry a valid
/// EIP-55 checksum; all-lowercase or all-uppercase input is accepted as is.
pub fn parse_address(input: &str) -> OtcResult<Address> {
    let trimmed = input.trim();
    let invalid = || OtcError::InvalidAddress(input.to_string());

    let hex_part = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(trimmed, None).map_err(|_| invalid())
    } else {
        Address::from_str(trimmed).map_err(|_| invalid())
    }
}

/// "0x44Dd...4d6d"
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
