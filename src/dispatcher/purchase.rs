// Buyer purchase flows. Payments go straight to the receiver; token delivery
// is a separate escrow release by the seller.

use alloy_primitives::{Address, U256};
use tracing::info;

use super::{ActionDispatcher, ActionReport, RefreshScope};
use crate::contracts::submit;
use crate::error::{OtcError, OtcResult};
use crate::types::{format_amount, parse_positive_amount, ExchangeRates, PaymentMethod, Session, TOKEN_DECIMALS};
use crate::wallet::TxRequest;

/// Price of `amount` tokens at `rate` (both 18-decimal). `None` when the rate is unset.
pub fn quote_payment(amount: U256, rate: U256) -> OtcResult<Option<U256>> {
    if rate.is_zero() {
        return Ok(None);
    }
    let scale = U256::from(10u64).pow(U256::from(TOKEN_DECIMALS));
    let product = amount
        .checked_mul(rate)
        .ok_or_else(|| OtcError::InvalidAmount(format!("{} is too large to price", format_amount(amount))))?;
    Ok(Some(product / scale))
}

pub fn off_platform_instructions(account: &Address, amount: &str, method_info: &str) -> String {
    format!(
        "Pay the seller through your agreed channel and include:\nBuyer wallet: {}\nAmount: {}\nPayment method: {}",
        account.to_checksum(None),
        amount.trim(),
        method_info.trim()
    )
}

const SETTLEMENT_NOTE: &str =
    "Payment is not atomic with delivery: the seller still has to release the tokens to your wallet";

impl ActionDispatcher {
    fn priced(&self, rates: &ExchangeRates, method: PaymentMethod, amount: U256) -> OtcResult<U256> {
        let symbol = match method {
            PaymentMethod::Stable => &self.symbols.stable,
            _ => &self.symbols.native,
        };
        let rate = rates
            .rate_for(method)
            .ok_or_else(|| OtcError::RateNotSet(symbol.clone()))?;
        match quote_payment(amount, rate)? {
            Some(payment) if !payment.is_zero() => Ok(payment),
            _ => Err(OtcError::InvalidAmount(format_amount(amount))),
        }
    }

    pub(super) async fn buy_with_native(
        &self,
        session: &Session,
        rates: &ExchangeRates,
        amount: &str,
    ) -> OtcResult<ActionReport> {
        let amount = parse_positive_amount(amount)?;
        let payment = self.priced(rates, PaymentMethod::Native, amount)?;
        let account = self.ready_account(session)?;

        let wallet = self.wallet.as_ref();
        let gas_price = self.gas.gas_price(wallet).await?;
        let limit = self.gas.fixed_limit();
        let gas_cost = gas_price.saturating_mul(U256::from(limit.limit));
        let total = payment.saturating_add(gas_cost);

        let available = self.balances.native_balance(account).await?;
        info!(
            "Native purchase: payment {} + gas {} = {}, balance {}",
            format_amount(payment),
            format_amount(gas_cost),
            format_amount(total),
            format_amount(available)
        );
        if available < total {
            return Err(OtcError::InsufficientBalance {
                asset: self.symbols.native.clone(),
                required: format_amount(total),
                available: format_amount(available),
            });
        }

        let tx = TxRequest::call(self.owner, Vec::new()).from(account).value(payment);
        let submitted = submit(wallet, tx, limit, gas_price).await?;
        Ok(ActionReport::submitted(
            "buy with native coin",
            submitted,
            format!(
                "Paid {} {} for {} {}. {}",
                format_amount(payment),
                self.symbols.native,
                format_amount(amount),
                self.symbols.token,
                SETTLEMENT_NOTE
            ),
            RefreshScope::Balances,
        ))
    }

    pub(super) async fn buy_with_stable(
        &self,
        session: &Session,
        rates: &ExchangeRates,
        amount: &str,
    ) -> OtcResult<ActionReport> {
        let amount = parse_positive_amount(amount)?;
        let payment = self.priced(rates, PaymentMethod::Stable, amount)?;
        let account = self.ready_account(session)?;

        let balances = &session.balances;
        if balances.stable_allowance < payment {
            return Err(OtcError::InsufficientAllowance {
                asset: self.symbols.stable.clone(),
                required: format_amount(payment),
                approved: format_amount(balances.stable_allowance),
            });
        }
        if balances.stable < payment {
            return Err(OtcError::InsufficientBalance {
                asset: self.symbols.stable.clone(),
                required: format_amount(payment),
                available: format_amount(balances.stable),
            });
        }

        let submitted = self.stable.transfer(account, self.owner, payment).await?;
        Ok(ActionReport::submitted(
            "buy with stablecoin",
            submitted,
            format!(
                "Paid {} {} for {} {}. {}",
                format_amount(payment),
                self.symbols.stable,
                format_amount(amount),
                self.symbols.token,
                SETTLEMENT_NOTE
            ),
            RefreshScope::Balances,
        ))
    }

    pub(super) fn buy_off_platform(&self, session: &Session, amount: &str, method_info: &str) -> OtcResult<ActionReport> {
        parse_positive_amount(amount)?;
        if method_info.trim().is_empty() {
            return Err(OtcError::MissingPaymentInfo);
        }
        let account = session.account.ok_or(OtcError::NotConnected)?;

        Ok(ActionReport::new(
            "buy off-platform",
            off_platform_instructions(&account, amount, method_info),
            RefreshScope::Nothing,
        ))
    }
}
