//! # comptoir-core: Pure Business Logic for Comptoir POS
//!
//! This crate holds the settlement rules of Comptoir POS as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comptoir POS Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                 comptoir-engine (use cases)                     │    │
//! │  │   create_sale, add_payment, cancel, open/close session, ledger  │    │
//! │  │   one SQLite transaction per call, retried on lock contention   │    │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘    │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────┐  ┌────────────▼───────────────┐    │
//! │  │  ★ comptoir-core (THIS CRATE) ★ │  │  comptoir-db               │    │
//! │  │                                 │  │  repositories, migrations  │    │
//! │  │  money      currency            │  └────────────────────────────┘    │
//! │  │  allocation pricing             │                                    │
//! │  │  settlement session  events     │                                    │
//! │  │                                 │                                    │
//! │  │  NO I/O • NO DATABASE • PURE    │                                    │
//! │  └─────────────────────────────────┘                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, StockLot, Sale, Payment, CashSession)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`currency`] - Exchange-rate snapshot and half-up conversion
//! - [`allocation`] - FIFO / FEFO lot allocation plans, landed costs
//! - [`pricing`] - Line pricing and sale totals
//! - [`settlement`] - Payments against totals, cash change
//! - [`session`] - Cash session reconciliation
//! - [`events`] - Typed activity log events
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use comptoir_core::money::Money;
//! use comptoir_core::pricing::{compute_totals, price_line, LineInput};
//! use comptoir_core::types::TaxRate;
//!
//! let line = price_line(LineInput {
//!     unit_price: Money::from_major(1000),
//!     quantity: 2,
//!     discount: Money::zero(),
//!     tax_rate: TaxRate::from_percent(18),
//! })
//! .unwrap();
//! let totals = compute_totals(&[line], Money::zero()).unwrap();
//!
//! assert_eq!(totals.total, Money::from_major(2360));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod currency;
pub mod error;
pub mod events;
pub mod money;
pub mod pricing;
pub mod session;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use allocation::{AllocationPlan, AllocationPolicy, OversellPolicy};
pub use currency::CurrencyConverter;
pub use error::{CoreError, CoreResult, ValidationError};
pub use events::{ActivityEntry, ActivityEvent};
pub use money::Money;
pub use settlement::Settlement;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Base accounting currency when configuration does not say otherwise.
pub const DEFAULT_BASE_CURRENCY: &str = "XOF";

/// Maximum lines in a single sale.
///
/// ## Business Reason
/// Keeps one sale transaction short enough that lot locks are not held
/// for long under concurrent checkouts.
pub const MAX_SALE_LINES: usize = 200;

/// Maximum quantity on a single line or movement.
///
/// ## Business Reason
/// Catches keying errors (10000 typed for 10) at wholesale counters.
pub const MAX_LINE_QUANTITY: i64 = 9_999;
