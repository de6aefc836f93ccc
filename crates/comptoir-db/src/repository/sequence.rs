//! # Business Number Sequences
//!
//! Ticket and lot numbers come from the `sequences` table, bumped inside
//! the caller's transaction. A rolled-back transaction gives its number
//! back; two committed transactions never share one.
//!
//! ```text
//! UPDATE sequences SET last_value = last_value + 1 WHERE name = 'ticket'
//! RETURNING last_value                              → 42
//! ticket_number = T20240115-000042
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};

pub const TICKET_SEQUENCE: &str = "ticket";
pub const LOT_SEQUENCE: &str = "lot";

/// Reserves the next value of a named sequence.
///
/// Being a write, this also takes the SQLite writer lock for the rest of
/// the transaction.
pub async fn next_value(conn: &mut SqliteConnection, name: &str) -> DbResult<i64> {
    let value: Option<i64> = sqlx::query_scalar(
        "UPDATE sequences SET last_value = last_value + 1 WHERE name = ?1 RETURNING last_value",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    value.ok_or_else(|| DbError::not_found("Sequence", name))
}

/// Formats a ticket number: `T{YYYYMMDD}-{seq:06}`.
pub fn format_ticket_number(at: DateTime<Utc>, seq: i64) -> String {
    format!("T{}-{:06}", at.format("%Y%m%d"), seq)
}

/// Formats a lot number: `L{seq:06}`.
pub fn format_lot_number(seq: i64) -> String {
    format!("L{:06}", seq)
}

/// Reserves and formats the next ticket number.
pub async fn next_ticket_number(conn: &mut SqliteConnection, at: DateTime<Utc>) -> DbResult<String> {
    let seq = next_value(conn, TICKET_SEQUENCE).await?;
    Ok(format_ticket_number(at, seq))
}

/// Reserves and formats the next lot number.
pub async fn next_lot_number(conn: &mut SqliteConnection) -> DbResult<String> {
    let seq = next_value(conn, LOT_SEQUENCE).await?;
    Ok(format_lot_number(seq))
}

// =============================================================================
// Unit Tests
// =============================================================================
