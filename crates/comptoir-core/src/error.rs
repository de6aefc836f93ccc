//! # Error Types
//!
//! Domain-specific error types for comptoir-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  comptoir-core errors (this file)                                       │
//! │  ├── CoreError        - Conversion and arithmetic failures              │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  comptoir-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  comptoir-engine errors                                                 │
//! │  └── EngineError      - Validation / Conflict / NotFound / State /      │
//! │                         Transient / Fatal, what callers see             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (code, ID, status)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Currency code is not in the active rate table.
    ///
    /// ## When This Occurs
    /// - Sale or payment in a currency that was never configured
    /// - Currency exists but `is_active = false`
    #[error("Unknown or inactive currency: {0}")]
    UnknownCurrency(String),

    /// Exchange rate is zero or negative.
    #[error("Invalid exchange rate for {code}: {rate}")]
    InvalidExchangeRate { code: String, rate: String },

    /// Arithmetic left the representable range.
    ///
    /// ## When This Occurs
    /// - Absurd quantities multiplied by large unit prices
    /// - Conversion through an extreme exchange rate
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an AmountOverflow error for the given computation.
    pub fn overflow(context: impl Into<String>) -> Self {
        CoreError::AmountOverflow {
            context: context.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any transaction is opened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, malformed currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A discount larger than the amount it applies to.
    #[error("{field} of {discount} exceeds {base}")]
    DiscountTooLarge {
        field: String,
        discount: i64,
        base: i64,
    },

    /// A request without any sale lines.
    #[error("A sale needs at least one line")]
    NoLines,

    /// Too many lines in one request.
    #[error("A sale cannot have more than {max} lines")]
    TooManyLines { max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
