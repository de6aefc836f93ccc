//! # Engine Error Types
//!
//! One error type for every use case, grouped into the categories callers
//! act on.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │   Validation    │  │    Conflict     │  │      NotFound           │  │
//! │  │                 │  │                 │  │                         │  │
//! │  │  bad input      │  │  RegisterAlready│  │  NotFound               │  │
//! │  │  UnknownCurrency│  │    Open         │  │  LotNotFound            │  │
//! │  │  NoPrice        │  │  Insufficient   │  │                         │  │
//! │  │                 │  │    Stock        │  │                         │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │     State       │  │   Transient     │  │        Fatal            │  │
//! │  │                 │  │                 │  │                         │  │
//! │  │  SessionNotOpen │  │  SQLITE_BUSY    │  │  storage failures       │  │
//! │  │  AlreadyCancel- │  │  lost lot race  │  │  bad configuration      │  │
//! │  │    led, ...     │  │  → retried      │  │                         │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failed use case rolls back its transaction, so no category ever
//! leaves partial writes behind.

use serde::Serialize;
use thiserror::Error;

use comptoir_core::{CoreError, PaymentStatus, SaleStatus, SessionStatus, ValidationError};
use comptoir_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Coarse category of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing or malformed input.
    Validation,
    /// The request clashes with existing state (duplicate open session, oversell).
    Conflict,
    /// Unknown sale, lot, session, product or payment.
    NotFound,
    /// Operation not valid for the entity's current status.
    State,
    /// Lock contention; the whole use case may be retried.
    Transient,
    /// Unrecoverable.
    Fatal,
}

/// Engine error type covering every use case failure.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Input validation failed.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Currency missing from the active rate table.
    #[error("Unknown or inactive currency: {0}")]
    UnknownCurrency(String),

    /// Product has no price in the sale currency nor in the base currency.
    #[error("Product {product_id} has no price in {currency}")]
    NoPrice { product_id: String, currency: String },

    /// Product exists but is not sold anymore.
    #[error("Product {0} is inactive")]
    ProductInactive(String),

    /// Amount arithmetic overflowed on the given input.
    #[error("Amount overflow while computing {0}")]
    AmountOverflow(String),

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    /// The register already has an open session.
    #[error("Register {register_id} already has an open session")]
    RegisterAlreadyOpen { register_id: String },

    /// Not enough stock under the reject policy, or for a write-off.
    #[error("Insufficient stock for {subject}: requested {requested}, available {available}")]
    InsufficientStock {
        subject: String,
        requested: i64,
        available: i64,
    },

    /// A lot refilled since the sale has no room for the returned units.
    #[error("Lot {lot_id} cannot take back {quantity} units (room for {room})")]
    LotCapacityExceeded { lot_id: String, quantity: i64, room: i64 },

    /// A unique value is already taken.
    #[error("Duplicate {field}: '{value}'")]
    Duplicate { field: String, value: String },

    // =========================================================================
    // Not Found Errors
    // =========================================================================
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Stock lot not found.
    #[error("Stock lot not found: {0}")]
    LotNotFound(String),

    // =========================================================================
    // State Errors
    // =========================================================================
    /// Closing a session that is not open.
    #[error("Session {session_id} is not open (status: {status})")]
    SessionNotOpen { session_id: String, status: SessionStatus },

    /// Validating a session that is not closed.
    #[error("Session {session_id} is not closed (status: {status})")]
    SessionNotClosed { session_id: String, status: SessionStatus },

    /// Selling or taking payment against a session that is not open.
    #[error("Session {session_id} cannot take sales (status: {status})")]
    SessionInvalid { session_id: String, status: SessionStatus },

    /// Cancelling a sale twice.
    #[error("Sale {0} is already cancelled")]
    AlreadyCancelled(String),

    /// Operation needs a pending sale.
    #[error("Sale {sale_id} is not pending (status: {status})")]
    SaleNotPending { sale_id: String, status: SaleStatus },

    /// Refunded sales are closed for cancellation.
    #[error("Sale {sale_id} cannot be cancelled (status: {status})")]
    SaleNotCancellable { sale_id: String, status: SaleStatus },

    /// Gateway confirmation for a payment that is not pending.
    #[error("Payment {payment_id} is not pending (status: {status})")]
    PaymentNotPending { payment_id: String, status: PaymentStatus },

    // =========================================================================
    // Transient Errors
    // =========================================================================
    /// Lock contention or a lost compare-and-swap race.
    #[error("Transient failure: {0}")]
    Transient(String),

    // =========================================================================
    // Fatal Errors
    // =========================================================================
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_)
            | EngineError::UnknownCurrency(_)
            | EngineError::NoPrice { .. }
            | EngineError::ProductInactive(_)
            | EngineError::AmountOverflow(_) => ErrorKind::Validation,

            EngineError::RegisterAlreadyOpen { .. }
            | EngineError::InsufficientStock { .. }
            | EngineError::LotCapacityExceeded { .. }
            | EngineError::Duplicate { .. } => ErrorKind::Conflict,

            EngineError::NotFound { .. } | EngineError::LotNotFound(_) => ErrorKind::NotFound,

            EngineError::SessionNotOpen { .. }
            | EngineError::SessionNotClosed { .. }
            | EngineError::SessionInvalid { .. }
            | EngineError::AlreadyCancelled(_)
            | EngineError::SaleNotPending { .. }
            | EngineError::SaleNotCancellable { .. }
            | EngineError::PaymentNotPending { .. } => ErrorKind::State,

            EngineError::Transient(_) => ErrorKind::Transient,

            EngineError::Config(_) | EngineError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the whole use case may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

/// Converts database errors.
///
/// ## Mapping
/// ```text
/// Busy / PoolExhausted → Transient
/// NotFound             → NotFound
/// UniqueViolation      → Duplicate
/// everything else      → Fatal (logged)
/// ```
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Busy(msg) => EngineError::Transient(msg),
            DbError::PoolExhausted => EngineError::Transient("connection pool exhausted".to_string()),
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => EngineError::Duplicate { field, value },
            other => {
                tracing::error!(error = %other, "Storage operation failed");
                EngineError::Fatal(other.to_string())
            }
        }
    }
}

/// Converts core errors.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownCurrency(code) => EngineError::UnknownCurrency(code),
            CoreError::InvalidExchangeRate { .. } => EngineError::Fatal(err.to_string()),
            CoreError::AmountOverflow { context } => EngineError::AmountOverflow(context),
            CoreError::Validation(v) => EngineError::Validation(v),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::from(DbError::from(err))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_retryable() {
        let err = EngineError::from(DbError::Busy("database is locked".to_string()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            EngineError::RegisterAlreadyOpen {
                register_id: "R".to_string()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(EngineError::LotNotFound("l".to_string()).kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::AlreadyCancelled("s".to_string()).kind(), ErrorKind::State);
        assert_eq!(
            EngineError::LotCapacityExceeded {
                lot_id: "l".to_string(),
                quantity: 2,
                room: 0
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(EngineError::from(ValidationError::NoLines).kind(), ErrorKind::Validation);
        assert!(!EngineError::Fatal("disk".to_string()).is_retryable());
    }

    #[test]
    fn test_core_error_mapping() {
        let err = EngineError::from(CoreError::UnknownCurrency("ZZZ".to_string()));
        assert!(matches!(err, EngineError::UnknownCurrency(ref c) if c == "ZZZ"));

        let err = EngineError::from(CoreError::Validation(ValidationError::NoLines));
        assert!(matches!(err, EngineError::Validation(ValidationError::NoLines)));
    }

    #[test]
    fn test_error_kind_serialization() {
        assert_eq!(serde_json::to_string(&ErrorKind::NotFound).unwrap(), "\"NOT_FOUND\"");
    }
}
