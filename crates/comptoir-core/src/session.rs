//! # Cash Session Rules
//!
//! State machine and reconciliation math for register cash sessions.
//!
//! ## State Machine
//! ```text
//!   open_session            close_session             validate_session
//!  ─────────────► ┌──────┐ ──────────────► ┌────────┐ ───────────────► ┌───────────┐
//!                 │ open │                 │ closed │                  │ validated │
//!                 └──────┘                 └────────┘                  └───────────┘
//!                 sales may be             cash frozen,                 terminal
//!                 recorded                 variance computed
//! ```
//!
//! ## Reconciliation
//! ```text
//! expected = opening + Σ (cash amount_base − change_base)   completed only
//! variance = closing − expected                            informational
//! ```

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Figures frozen when a session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub opening: Money,
    pub cash_in: Money,
    pub expected: Money,
    pub closing: Money,
    pub variance: Money,
}

impl Reconciliation {
    /// Computes expected cash and variance.
    ///
    /// `net_cash_payments` are the completed cash payments of the session,
    /// already net of change handed back.
    ///
    /// ## Example
    /// ```rust
    /// use comptoir_core::money::Money;
    /// use comptoir_core::session::Reconciliation;
    ///
    /// let r = Reconciliation::compute(
    ///     Money::from_major(10_000),
    ///     [Money::from_major(2360)],
    ///     Money::from_major(12_000),
    /// );
    /// assert_eq!(r.expected, Money::from_major(12_360));
    /// assert_eq!(r.variance, Money::from_major(-360));
    /// ```
    pub fn compute(
        opening: Money,
        net_cash_payments: impl IntoIterator<Item = Money>,
        closing: Money,
    ) -> Self {
        let cash_in: Money = net_cash_payments.into_iter().sum();
        let expected = opening + cash_in;
        Reconciliation {
            opening,
            cash_in,
            expected,
            closing,
            variance: closing - expected,
        }
    }

    /// True when the counted drawer matches the system figure.
    pub fn is_balanced(&self) -> bool {
        self.variance.is_zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
