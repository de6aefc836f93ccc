//! # Repository Module
//!
//! Database repository implementations for Comptoir POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Reads outside a use case: pool-backed methods on `&self`               │
//! │       db.lots().for_product(&product_id)                                │
//! │                                                                         │
//! │  Writes inside a use case: associated functions on a connection        │
//! │       let mut tx = db.begin().await?;                                   │
//! │       LotRepository::take(&mut tx, &lot_id, 2, now).await?;             │
//! │       MovementRepository::append(&mut tx, &movement).await?;            │
//! │       tx.commit().await?;                                               │
//! │                                                                         │
//! │  The engine owns the transaction; repositories never begin or commit.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Product and price lookups
//! - [`currency::CurrencyRepository`] - Exchange-rate table
//! - [`lot::LotRepository`] / [`lot::MovementRepository`] - Lots, CAS updates, movements
//! - [`session::SessionRepository`] - Cash sessions and drawer totals
//! - [`sale::SaleRepository`] - Sales, lines, allocations, payments
//! - [`activity::ActivityRepository`] - Append-only activity log
//! - [`sequence`] - Ticket and lot numbers

pub mod activity;
pub mod currency;
pub mod lot;
pub mod product;
pub mod sale;
pub mod sequence;
pub mod session;

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{DbError, DbResult};

/// Parses a decimal stored as TEXT.
pub(crate) fn parse_decimal(field: &str, raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| DbError::decode(field, e))
}
