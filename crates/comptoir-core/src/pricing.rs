//! # Line Pricing and Sale Totals
//!
//! All line math happens in the sale's own currency; conversion to the
//! base currency happens once, on the aggregated total.
//!
//! ## Formulas
//! ```text
//! line_total = unit_price × quantity − line_discount      (pre-tax)
//! line_tax   = round_half_up(line_total × tax_bps / 10000)
//!
//! subtotal   = Σ line_total
//! tax        = Σ line_tax
//! total      = subtotal − sale_discount + tax
//! ```
//!
//! ## Example (1000.00 XOF, 18% VAT, qty 2)
//! ```text
//! line_total = 1000.00 × 2 − 0 = 2000.00
//! line_tax   = 2000.00 × 18%  =  360.00
//! total      = 2000.00 − 0 + 360.00 = 2360.00
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::TaxRate;
use crate::validation::{validate_discount, validate_quantity};

/// Inputs needed to price one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub unit_price: Money,
    pub quantity: i64,
    pub discount: Money,
    pub tax_rate: TaxRate,
}

/// A line after pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub unit_price: Money,
    pub quantity: i64,
    pub discount: Money,
    pub tax_rate: TaxRate,
    /// Pre-tax, after line discount.
    pub line_total: Money,
    pub tax: Money,
}

/// Aggregated sale amounts in the sale currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Prices a single line.
///
/// ## Errors
/// - quantity outside `1..=MAX_LINE_QUANTITY`
/// - negative unit price
/// - discount negative or above `unit_price × quantity`
/// - overflow on absurd inputs
pub fn price_line(input: LineInput) -> CoreResult<PricedLine> {
    validate_quantity(input.quantity)?;
    if input.unit_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit price".to_string(),
        }
        .into());
    }

    let gross = input
        .unit_price
        .checked_multiply_quantity(input.quantity)
        .ok_or_else(|| CoreError::overflow("line gross amount"))?;
    validate_discount("line discount", input.discount, gross)?;

    let line_total = gross - input.discount;
    let tax = line_total.calculate_tax(input.tax_rate);

    Ok(PricedLine {
        unit_price: input.unit_price,
        quantity: input.quantity,
        discount: input.discount,
        tax_rate: input.tax_rate,
        line_total,
        tax,
    })
}

/// Aggregates priced lines and applies the sale-level discount.
///
/// Tax is the sum of line taxes; the sale discount does not re-base tax.
pub fn compute_totals(lines: &[PricedLine], sale_discount: Money) -> CoreResult<SaleTotals> {
    if lines.is_empty() {
        return Err(ValidationError::NoLines.into());
    }

    let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
    let tax: Money = lines.iter().map(|l| l.tax).sum();
    validate_discount("sale discount", sale_discount, subtotal)?;

    Ok(SaleTotals {
        subtotal,
        discount: sale_discount,
        tax,
        total: subtotal - sale_discount + tax,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, qty: i64, discount: i64, bps: u32) -> LineInput {
        LineInput {
            unit_price: Money::from_cents(price),
            quantity: qty,
            discount: Money::from_cents(discount),
            tax_rate: TaxRate::from_bps(bps),
        }
    }

    #[test]
    fn test_price_line_with_vat() {
        let priced = price_line(line(100_000, 2, 0, 1800)).unwrap();
        assert_eq!(priced.line_total, Money::from_major(2000));
        assert_eq!(priced.tax, Money::from_major(360));
    }

    #[test]
    fn test_line_discount_reduces_taxable_amount() {
        let priced = price_line(line(100_000, 2, 20_000, 1800)).unwrap();
        assert_eq!(priced.line_total, Money::from_major(1800));
        assert_eq!(priced.tax, Money::from_major(324));
    }

    #[test]
    fn test_line_discount_cannot_exceed_gross() {
        assert!(price_line(line(1000, 1, 1001, 0)).is_err());
        assert!(price_line(line(1000, 1, -1, 0)).is_err());
        assert!(price_line(line(1000, 1, 1000, 0)).is_ok());
    }

    #[test]
    fn test_rejects_bad_quantity_and_price() {
        assert!(price_line(line(1000, 0, 0, 0)).is_err());
        assert!(price_line(line(-5, 1, 0, 0)).is_err());
    }

    #[test]
    fn test_compute_totals_scenario() {
        let lines = vec![price_line(line(100_000, 2, 0, 1800)).unwrap()];
        let totals = compute_totals(&lines, Money::zero()).unwrap();

        assert_eq!(totals.subtotal, Money::from_major(2000));
        assert_eq!(totals.tax, Money::from_major(360));
        assert_eq!(totals.total, Money::from_major(2360));
    }

    #[test]
    fn test_compute_totals_with_sale_discount() {
        let lines = vec![
            price_line(line(50_000, 1, 0, 1800)).unwrap(),
            price_line(line(25_000, 2, 0, 0)).unwrap(),
        ];
        let totals = compute_totals(&lines, Money::from_major(100)).unwrap();

        assert_eq!(totals.subtotal, Money::from_major(1000));
        assert_eq!(totals.tax, Money::from_major(90));
        assert_eq!(totals.total, Money::from_major(990));
    }

    #[test]
    fn test_compute_totals_rejects_empty_and_excess_discount() {
        assert!(matches!(
            compute_totals(&[], Money::zero()),
            Err(CoreError::Validation(ValidationError::NoLines))
        ));

        let lines = vec![price_line(line(1000, 1, 0, 0)).unwrap()];
        assert!(compute_totals(&lines, Money::from_cents(1001)).is_err());
    }
}
