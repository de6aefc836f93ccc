//! # Settlement Evaluation
//!
//! Matches payments to a sale's base-currency total.
//!
//! ## Rules
//! ```text
//! paid       = Σ amount_base of COMPLETED payments
//! settled    = paid ≥ total_base
//! balance    = max(0, total_base − paid)
//! change due = max(0, paid − total_base)
//!
//! Cash change is attributed to the cash tender that crossed the total:
//!   total 2360, tenders [card 1000, cash 1500]
//!   card: due 2360 → no change
//!   cash: due 1360 → change 140
//! ```
//!
//! Pending (gateway) payments never count towards `paid`.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{Payment, PaymentMethod, PaymentStatus};

/// Settlement state of a sale, base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub total_base: Money,
    pub amount_paid_base: Money,
    pub balance_due_base: Money,
    pub change_due_base: Money,
}

impl Settlement {
    /// Builds a settlement from a total and the completed base amounts.
    pub fn evaluate(total_base: Money, completed_base: impl IntoIterator<Item = Money>) -> Self {
        let paid: Money = completed_base.into_iter().sum();
        Settlement {
            total_base,
            amount_paid_base: paid,
            balance_due_base: (total_base - paid).clamp_non_negative(),
            change_due_base: (paid - total_base).clamp_non_negative(),
        }
    }

    /// Builds a settlement from payment records, counting only completed ones.
    pub fn from_payments<'a>(total_base: Money, payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        Settlement::evaluate(
            total_base,
            payments
                .into_iter()
                .filter(|p| p.status == PaymentStatus::Completed)
                .map(Payment::amount_base),
        )
    }

    /// Whether completed payments cover the total.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.amount_paid_base >= self.total_base
    }
}

/// Change to record on a tender, base currency.
///
/// Only cash gives change. `paid_before` is the completed amount already
/// applied to the sale before this tender.
///
/// ## Example
/// ```rust
/// use comptoir_core::money::Money;
/// use comptoir_core::settlement::change_for_tender;
/// use comptoir_core::types::PaymentMethod;
///
/// let change = change_for_tender(
///     PaymentMethod::Cash,
///     Money::from_major(2360),
///     Money::zero(),
///     Money::from_major(2500),
/// );
/// assert_eq!(change, Money::from_major(140));
/// ```
pub fn change_for_tender(
    method: PaymentMethod,
    total_base: Money,
    paid_before: Money,
    amount_base: Money,
) -> Money {
    if !method.is_cash() {
        return Money::zero();
    }
    let due = (total_base - paid_before).clamp_non_negative();
    let change = (amount_base - due).clamp_non_negative();
    if change > amount_base {
        amount_base
    } else {
        change
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_payment_settles() {
        let s = Settlement::evaluate(Money::from_major(2360), [Money::from_major(2360)]);
        assert!(s.is_settled());
        assert_eq!(s.balance_due_base, Money::zero());
        assert_eq!(s.change_due_base, Money::zero());
    }

    #[test]
    fn test_partial_payment_leaves_balance() {
        let s = Settlement::evaluate(Money::from_major(2360), [Money::from_major(1000)]);
        assert!(!s.is_settled());
        assert_eq!(s.balance_due_base, Money::from_major(1360));
    }

    #[test]
    fn test_overpayment_reports_change() {
        let s = Settlement::evaluate(
            Money::from_major(2360),
            [Money::from_major(1000), Money::from_major(1500)],
        );
        assert!(s.is_settled());
        assert_eq!(s.change_due_base, Money::from_major(140));
    }

    #[test]
    fn test_change_attributed_to_crossing_cash_tender() {
        let total = Money::from_major(2360);
        let card = change_for_tender(PaymentMethod::Card, total, Money::zero(), Money::from_major(1000));
        let cash = change_for_tender(
            PaymentMethod::Cash,
            total,
            Money::from_major(1000),
            Money::from_major(1500),
        );
        assert_eq!(card, Money::zero());
        assert_eq!(cash, Money::from_major(140));
    }

    #[test]
    fn test_cash_after_settlement_is_all_change() {
        let change = change_for_tender(
            PaymentMethod::Cash,
            Money::from_major(100),
            Money::from_major(100),
            Money::from_major(20),
        );
        assert_eq!(change, Money::from_major(20));
    }

    #[test]
    fn test_card_overpayment_gives_no_change() {
        let change = change_for_tender(
            PaymentMethod::Card,
            Money::from_major(100),
            Money::zero(),
            Money::from_major(150),
        );
        assert_eq!(change, Money::zero());
    }
}
