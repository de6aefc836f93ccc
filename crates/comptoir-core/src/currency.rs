//! # Currency Conversion
//!
//! Point-in-time conversion between the base accounting currency and the
//! currencies a sale or payment may be expressed in.
//!
//! ## Snapshot Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  currencies table (maintained externally, may change at any time)       │
//! │       │                                                                 │
//! │       ▼  loaded once per transaction                                    │
//! │  CurrencyConverter { base: "XOF", rates: {XOF: 1, EUR: 655.957, ...} }  │
//! │       │                                                                 │
//! │       ├── rate("EUR")            → 655.957  (persisted on Sale/Payment) │
//! │       ├── convert_to_base(10 EUR) → 6559.57 XOF                         │
//! │       └── convert_between(a, from, to) → a × rate(from) / rate(to)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every conversion rounds half-up (away from zero) to two decimals.
//! Rates are never read again for historical records: the rate used is
//! stored next to the converted amount.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::Currency;

/// Immutable snapshot of the active exchange-rate table.
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    base: String,
    rates: HashMap<String, Decimal>,
}

impl CurrencyConverter {
    /// Builds a converter from currency records.
    ///
    /// Inactive currencies are skipped. The base currency is always present
    /// with rate 1 regardless of what the table says.
    ///
    /// ## Errors
    /// `InvalidExchangeRate` if an active currency has a rate ≤ 0.
    pub fn new<'a>(
        base: impl Into<String>,
        currencies: impl IntoIterator<Item = &'a Currency>,
    ) -> CoreResult<Self> {
        let base = base.into();
        let mut rates = HashMap::new();

        for currency in currencies {
            if !currency.is_active || currency.code == base {
                continue;
            }
            if currency.rate_to_base <= Decimal::ZERO {
                return Err(CoreError::InvalidExchangeRate {
                    code: currency.code.clone(),
                    rate: currency.rate_to_base.to_string(),
                });
            }
            rates.insert(currency.code.clone(), currency.rate_to_base);
        }

        rates.insert(base.clone(), Decimal::ONE);
        Ok(CurrencyConverter { base, rates })
    }

    /// A converter that only knows the base currency.
    pub fn base_only(base: impl Into<String>) -> Self {
        let base = base.into();
        let mut rates = HashMap::new();
        rates.insert(base.clone(), Decimal::ONE);
        CurrencyConverter { base, rates }
    }

    /// Base currency code.
    pub fn base_code(&self) -> &str {
        &self.base
    }

    /// Whether `code` is the base currency.
    pub fn is_base(&self, code: &str) -> bool {
        self.base == code
    }

    /// Rate from `code` to the base currency.
    ///
    /// ## Example
    /// ```rust
    /// use comptoir_core::currency::CurrencyConverter;
    /// use rust_decimal::Decimal;
    ///
    /// let fx = CurrencyConverter::base_only("XOF");
    /// assert_eq!(fx.rate("XOF").unwrap(), Decimal::ONE);
    /// assert!(fx.rate("EUR").is_err());
    /// ```
    pub fn rate(&self, code: &str) -> CoreResult<Decimal> {
        self.rates
            .get(code)
            .copied()
            .ok_or_else(|| CoreError::UnknownCurrency(code.to_string()))
    }

    /// Converts an amount in `code` to the base currency.
    pub fn convert_to_base(&self, amount: Money, code: &str) -> CoreResult<Money> {
        let rate = self.rate(code)?;
        convert_with_rate(amount, rate)
    }

    /// Converts a base-currency amount into `code`.
    pub fn convert_from_base(&self, amount: Money, code: &str) -> CoreResult<Money> {
        self.convert_between(amount, &self.base, code)
    }

    /// Converts `amount` from one currency to another through the base.
    ///
    /// Computed as `amount × rate(from) / rate(to)` in full decimal
    /// precision, then rounded once.
    pub fn convert_between(&self, amount: Money, from: &str, to: &str) -> CoreResult<Money> {
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        if from == to {
            return Ok(amount);
        }

        let value = amount
            .to_decimal()
            .checked_mul(from_rate)
            .and_then(|v| v.checked_div(to_rate))
            .ok_or_else(|| CoreError::overflow(format!("conversion {from} → {to}")))?;

        Money::from_decimal_half_up(value)
            .ok_or_else(|| CoreError::overflow(format!("conversion {from} → {to}")))
    }

    /// Active currency codes, base first, then alphabetical.
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self
            .rates
            .keys()
            .map(String::as_str)
            .filter(|c| *c != self.base)
            .collect();
        codes.sort_unstable();
        codes.insert(0, &self.base);
        codes
    }
}

/// Multiplies `amount` by `rate` and rounds half-up to two decimals.
///
/// Used when the rate was already snapshotted on a record.
pub fn convert_with_rate(amount: Money, rate: Decimal) -> CoreResult<Money> {
    amount
        .to_decimal()
        .checked_mul(rate)
        .and_then(Money::from_decimal_half_up)
        .ok_or_else(|| CoreError::overflow("rate conversion"))
}

/// Divides a base amount by `rate`, rounding half-up to two decimals.
///
/// Inverse of [`convert_with_rate`] up to one rounding unit.
pub fn revert_with_rate(amount_base: Money, rate: Decimal) -> CoreResult<Money> {
    if rate <= Decimal::ZERO {
        return Err(CoreError::InvalidExchangeRate {
            code: "snapshot".to_string(),
            rate: rate.to_string(),
        });
    }
    amount_base
        .to_decimal()
        .checked_div(rate)
        .and_then(Money::from_decimal_half_up)
        .ok_or_else(|| CoreError::overflow("rate reversion"))
}

// =============================================================================
// Unit Tests
// =============================================================================
