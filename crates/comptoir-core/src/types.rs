//! # Domain Types
//!
//! Core domain types used throughout Comptoir POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │    Product      │   │    StockLot     │   │  StockMovement  │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  id (UUID)      │◄──│  product_id     │◄──│  lot_id         │        │
//! │  │  sku            │   │  lot_number     │   │  movement_type  │        │
//! │  │  prices[code]   │   │  current ≤ init │   │  prev → new     │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐        │
//! │  │  CashSession    │   │      Sale       │   │    Payment      │        │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │        │
//! │  │  register_id    │◄──│  session_id     │──►│  sale_id        │        │
//! │  │  open/closed/   │   │  ticket_number  │   │  amount + rate  │        │
//! │  │  validated      │   │  SaleLine[]     │   │  amount_base    │        │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, lot_number, ticket_number) - human-readable
//!
//! ## Money Fields
//! Fields ending in `_cents` are hundredths of the currency named by the
//! owning record. Fields ending in `_base_cents` are in the base currency.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1800 bps = 18% (UEMOA standard VAT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a whole percentage (18 → 1800 bps).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        TaxRate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Actor
// =============================================================================

/// The authenticated caller of a mutating operation.
///
/// Supplied by the auth collaborator and trusted as-is; `id` is only used
/// for audit attribution on movements, sessions and the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: role.into(),
        }
    }

    /// Internal actor used by seeding and maintenance jobs.
    pub fn system() -> Self {
        Actor::new("system", "system")
    }
}

// =============================================================================
// Currency
// =============================================================================

/// A transaction currency with its rate to the base currency.
///
/// `rate_to_base` answers "how many base units is one unit of this currency
/// worth". The base currency itself always has rate 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    /// ISO 4217 code (XOF, EUR, USD).
    pub code: String,
    pub name: String,
    pub rate_to_base: Decimal,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// Owned by the catalog collaborator; the settlement core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Selling price in hundredths, keyed by currency code.
    pub prices: BTreeMap<String, i64>,

    /// Tax rate in basis points (1800 = 18%).
    pub tax_rate_bps: u32,

    /// Low-stock threshold.
    pub min_stock: i64,

    /// Overstock threshold.
    pub max_stock: Option<i64>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price in the given currency, if one is configured.
    pub fn price_in(&self, currency_code: &str) -> Option<Money> {
        self.prices.get(currency_code).copied().map(Money::from_cents)
    }

    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

// =============================================================================
// Stock Lot
// =============================================================================

/// Lot availability state.
///
/// `Depleted` iff `current_quantity == 0`, except that `Blocked` is sticky
/// until the lot is explicitly unblocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Available,
    Depleted,
    Blocked,
}

impl LotStatus {
    /// Status a non-blocked lot must have for the given quantity.
    #[inline]
    pub const fn for_quantity(current_quantity: i64) -> Self {
        if current_quantity == 0 {
            LotStatus::Depleted
        } else {
            LotStatus::Available
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Available => "available",
            LotStatus::Depleted => "depleted",
            LotStatus::Blocked => "blocked",
        }
    }
}

/// A physically or customs-distinct batch of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLot {
    pub id: String,
    /// Sequence-generated business number (L000042).
    pub lot_number: String,
    pub product_id: String,
    /// Set once at creation.
    pub initial_quantity: i64,
    /// Always within `0..=initial_quantity`.
    pub current_quantity: i64,
    /// Purchase price plus apportioned landed costs, per unit.
    pub unit_cost_cents: i64,
    pub received_at: DateTime<Utc>,
    pub expiry_at: Option<DateTime<Utc>>,
    /// Customs declaration or supplier batch reference.
    pub customs_ref: Option<String>,
    pub status: LotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockLot {
    /// True when the lot can satisfy allocation requests.
    pub fn is_allocatable(&self) -> bool {
        self.status == LotStatus::Available && self.current_quantity > 0
    }

    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }
}

// =============================================================================
// Stock Movement
// =============================================================================

/// The kind of ledger-affecting operation a movement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Goods receipt or manual stock entry.
    Entry,
    /// Allocation to a sale line.
    Sale,
    /// Stock returned to its lot by a cancellation.
    Return,
    /// Manual correction.
    Adjustment,
    /// Move between locations (recorded, not produced by this core).
    Transfer,
    /// Write-off: breakage, expiry, theft.
    Waste,
}

impl MovementType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entry => "entry",
            MovementType::Sale => "sale",
            MovementType::Return => "return",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Waste => "waste",
        }
    }
}

/// What a movement's `reference_id` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Sale,
    Receipt,
    Adjustment,
    WriteOff,
}

/// Immutable audit record of one quantity change on one lot.
///
/// `quantity` is signed: negative for sale/waste, positive for entry/return.
/// `new_quantity == previous_quantity + quantity` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub lot_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub reason: Option<String>,
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// Cash Session
// =============================================================================

/// Cash session lifecycle: `open → closed → validated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
    Validated,
}

impl SessionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
            SessionStatus::Validated => "validated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-register, per-operator cash accounting period.
///
/// All amounts are in the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashSession {
    pub id: String,
    pub register_id: String,
    pub operator_id: String,
    pub opening_cash_cents: i64,
    pub closing_cash_cents: Option<i64>,
    /// Computed at close.
    pub expected_cash_cents: Option<i64>,
    /// `closing - expected`, informational only.
    pub variance_cents: Option<i64>,
    pub status: SessionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<String>,
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a sale.
///
/// Transitions are one-directional: `pending → completed`, and
/// `pending | completed → cancelled` through the cancellation path only.
/// `refunded` is applied by the returns collaborator and is terminal here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Recorded, not yet fully paid.
    Pending,
    /// Fully settled.
    Completed,
    /// Reversed: stock returned, payments refunded.
    Cancelled,
    /// Refunded by an external returns flow.
    Refunded,
}

impl SaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Refunded => "refunded",
        }
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Pending
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sale header.
///
/// Line-level money is in `currency_code`; `total_base_cents` is the
/// converted total using `exchange_rate_to_base` snapshotted at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub id: String,
    pub ticket_number: String,
    pub session_id: String,
    pub currency_code: String,
    pub exchange_rate_to_base: Decimal,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    /// `subtotal - discount + tax`, sale currency.
    pub total_cents: i64,
    pub total_base_cents: i64,
    pub status: SaleStatus,
    pub cashier_id: String,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn total_base(&self) -> Money {
        Money::from_cents(self.total_base_cents)
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// A priced line of a sale.
///
/// Uses the snapshot pattern: price and tax rate are frozen at sale time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    pub id: String,
    pub sale_id: String,
    /// Submission order, starting at 1.
    pub line_no: i64,
    pub product_id: String,
    /// First lot allocated, `None` if nothing could be allocated.
    pub lot_id: Option<String>,
    pub quantity: i64,
    /// Units actually taken from lots; `quantity - allocated` is backordered.
    pub allocated_quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub tax_rate_bps: u32,
    pub tax_cents: i64,
    /// `unit_price × quantity - discount`, before tax.
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl SaleLine {
    /// Units requested but not allocated.
    #[inline]
    pub fn shortfall(&self) -> i64 {
        self.quantity - self.allocated_quantity
    }
}

/// One lot's contribution to a sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineAllocation {
    pub id: String,
    pub line_id: String,
    pub lot_id: String,
    pub quantity: i64,
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash in the register drawer.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Mobile money wallet (Orange Money, Wave, MTN MoMo).
    MobileMoney,
    BankTransfer,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    #[inline]
    pub const fn is_cash(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Waiting for a gateway callback.
    Pending,
    Completed,
    Refunded,
    /// Rejected by the gateway.
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment towards a sale.
/// A sale can have multiple payments for split tender scenarios,
/// each in its own currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub session_id: String,
    pub method: PaymentMethod,
    /// Amount tendered, in `currency_code`.
    pub amount_cents: i64,
    pub currency_code: String,
    /// Rate from `currency_code` to base, snapshotted when recorded.
    pub exchange_rate: Decimal,
    pub amount_base_cents: i64,
    /// Change handed back for this cash tender, base currency.
    pub change_base_cents: i64,
    pub status: PaymentStatus,
    /// Gateway or terminal reference.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount_base(&self) -> Money {
        Money::from_cents(self.amount_base_cents)
    }

    /// Amount retained by the business, base currency.
    #[inline]
    pub fn net_base(&self) -> Money {
        Money::from_cents(self.amount_base_cents - self.change_base_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
