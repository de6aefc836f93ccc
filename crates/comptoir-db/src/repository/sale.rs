//! # Sale Repository
//!
//! Database operations for sales, their lines, lot allocations and payments.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (one transaction)                                            │
//! │     └── insert() → Sale { status: Pending }                             │
//! │     └── insert_line() + insert_allocation() per lot used                │
//! │     └── insert_payment() per tender                                     │
//! │     └── mark_completed() when payments cover the total                  │
//! │                                                                         │
//! │  2. (OPTIONAL) MORE PAYMENTS                                            │
//! │     └── touch_pending() → locks a still-pending sale                    │
//! │     └── insert_payment() / settle_pending_payment()                     │
//! │                                                                         │
//! │  3. (OPTIONAL) CANCEL                                                   │
//! │     └── mark_cancelled() → Sale { status: Cancelled }                   │
//! │     └── refund_payments()                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sales and payments only ever change status; amounts are written once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::parse_decimal;
use crate::error::{DbError, DbResult};
use comptoir_core::{
    Payment, PaymentMethod, PaymentStatus, Sale, SaleLine, SaleLineAllocation, SaleStatus,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    ticket_number: String,
    session_id: String,
    currency_code: String,
    exchange_rate_to_base: String,
    subtotal_cents: i64,
    discount_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    total_base_cents: i64,
    status: SaleStatus,
    cashier_id: String,
    cancel_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        Ok(Sale {
            exchange_rate_to_base: parse_decimal("sales.exchange_rate_to_base", &row.exchange_rate_to_base)?,
            id: row.id,
            ticket_number: row.ticket_number,
            session_id: row.session_id,
            currency_code: row.currency_code,
            subtotal_cents: row.subtotal_cents,
            discount_cents: row.discount_cents,
            tax_cents: row.tax_cents,
            total_cents: row.total_cents,
            total_base_cents: row.total_base_cents,
            status: row.status,
            cashier_id: row.cashier_id,
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: String,
    sale_id: String,
    line_no: i64,
    product_id: String,
    lot_id: Option<String>,
    quantity: i64,
    allocated_quantity: i64,
    unit_price_cents: i64,
    discount_cents: i64,
    tax_rate_bps: i64,
    tax_cents: i64,
    line_total_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<LineRow> for SaleLine {
    fn from(row: LineRow) -> Self {
        SaleLine {
            id: row.id,
            sale_id: row.sale_id,
            line_no: row.line_no,
            product_id: row.product_id,
            lot_id: row.lot_id,
            quantity: row.quantity,
            allocated_quantity: row.allocated_quantity,
            unit_price_cents: row.unit_price_cents,
            discount_cents: row.discount_cents,
            tax_rate_bps: row.tax_rate_bps.clamp(0, 10_000) as u32,
            tax_cents: row.tax_cents,
            line_total_cents: row.line_total_cents,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AllocationRow {
    id: String,
    line_id: String,
    lot_id: String,
    quantity: i64,
}

impl From<AllocationRow> for SaleLineAllocation {
    fn from(row: AllocationRow) -> Self {
        SaleLineAllocation {
            id: row.id,
            line_id: row.line_id,
            lot_id: row.lot_id,
            quantity: row.quantity,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    sale_id: String,
    session_id: String,
    method: PaymentMethod,
    amount_cents: i64,
    currency_code: String,
    exchange_rate: String,
    amount_base_cents: i64,
    change_base_cents: i64,
    status: PaymentStatus,
    reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DbError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            exchange_rate: parse_decimal("payments.exchange_rate", &row.exchange_rate)?,
            id: row.id,
            sale_id: row.sale_id,
            session_id: row.session_id,
            method: row.method,
            amount_cents: row.amount_cents,
            currency_code: row.currency_code,
            amount_base_cents: row.amount_base_cents,
            change_base_cents: row.change_base_cents,
            status: row.status,
            reference: row.reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SALE_COLUMNS: &str = r#"
    id, ticket_number, session_id, currency_code, exchange_rate_to_base,
    subtotal_cents, discount_cents, tax_cents, total_cents, total_base_cents,
    status, cashier_id, cancel_reason, created_at, updated_at, completed_at, cancelled_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, sale_id, session_id, method, amount_cents, currency_code, exchange_rate,
    amount_base_cents, change_base_cents, status, reference, created_at, updated_at
"#;

// =============================================================================
// Output Types
// =============================================================================

/// A sale with everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleDetails {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    pub allocations: Vec<SaleLineAllocation>,
    pub payments: Vec<Payment>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale header by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets a sale with its lines, allocations and payments.
    pub async fn details(&self, id: &str) -> DbResult<Option<SaleDetails>> {
        let mut conn = self.pool.acquire().await?;

        let Some(sale) = Self::find(&mut conn, id).await? else {
            return Ok(None);
        };

        Ok(Some(SaleDetails {
            lines: Self::lines_for(&mut conn, id).await?,
            allocations: Self::allocations_for(&mut conn, id).await?,
            payments: Self::payments_for(&mut conn, id).await?,
            sale,
        }))
    }

    /// Gets a payment by ID.
    pub async fn get_payment(&self, id: &str) -> DbResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_payment(&mut conn, id).await
    }

    // -------------------------------------------------------------------------
    // Connection-scoped reads
    // -------------------------------------------------------------------------

    /// Gets a sale header on the caller's connection.
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Sale::try_from).transpose()
    }

    /// Lines of a sale in submission order.
    pub async fn lines_for(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let rows = sqlx::query_as::<_, LineRow>(
            r#"
            SELECT id, sale_id, line_no, product_id, lot_id, quantity, allocated_quantity,
                   unit_price_cents, discount_cents, tax_rate_bps, tax_cents, line_total_cents,
                   created_at
            FROM sale_lines
            WHERE sale_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(SaleLine::from).collect())
    }

    /// Every lot allocation made for a sale, line by line.
    pub async fn allocations_for(
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<Vec<SaleLineAllocation>> {
        let rows = sqlx::query_as::<_, AllocationRow>(
            r#"
            SELECT a.id, a.line_id, a.lot_id, a.quantity
            FROM sale_line_allocations a
            JOIN sale_lines l ON l.id = a.line_id
            WHERE l.sale_id = ?1
            ORDER BY l.line_no, a.rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(SaleLineAllocation::from).collect())
    }

    /// Payments of a sale, oldest first.
    pub async fn payments_for(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE sale_id = ?1 ORDER BY created_at, rowid");
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(sale_id)
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    /// Gets a payment on the caller's connection.
    pub async fn find_payment(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1");
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Payment::try_from).transpose()
    }

    // -------------------------------------------------------------------------
    // Inserts
    // -------------------------------------------------------------------------

    /// Inserts a sale header.
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(sale_id = %sale.id, ticket_number = %sale.ticket_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, ticket_number, session_id, currency_code, exchange_rate_to_base,
                subtotal_cents, discount_cents, tax_cents, total_cents, total_base_cents,
                status, cashier_id, cancel_reason,
                created_at, updated_at, completed_at, cancelled_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13,
                ?14, ?15, ?16, ?17
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.ticket_number)
        .bind(&sale.session_id)
        .bind(&sale.currency_code)
        .bind(sale.exchange_rate_to_base.to_string())
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.total_base_cents)
        .bind(sale.status)
        .bind(&sale.cashier_id)
        .bind(&sale.cancel_reason)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.completed_at)
        .bind(sale.cancelled_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts one sale line.
    ///
    /// ## Snapshot Pattern
    /// Unit price and tax rate are copied onto the line, so the sale stays
    /// reproducible after the catalog changes.
    pub async fn insert_line(conn: &mut SqliteConnection, line: &SaleLine) -> DbResult<()> {
        debug!(sale_id = %line.sale_id, line_no = line.line_no, product_id = %line.product_id, "Inserting sale line");

        sqlx::query(
            r#"
            INSERT INTO sale_lines (
                id, sale_id, line_no, product_id, lot_id, quantity, allocated_quantity,
                unit_price_cents, discount_cents, tax_rate_bps, tax_cents, line_total_cents,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&line.id)
        .bind(&line.sale_id)
        .bind(line.line_no)
        .bind(&line.product_id)
        .bind(&line.lot_id)
        .bind(line.quantity)
        .bind(line.allocated_quantity)
        .bind(line.unit_price_cents)
        .bind(line.discount_cents)
        .bind(line.tax_rate_bps as i64)
        .bind(line.tax_cents)
        .bind(line.line_total_cents)
        .bind(line.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Records that a line took `quantity` units from one lot.
    pub async fn insert_allocation(conn: &mut SqliteConnection, allocation: &SaleLineAllocation) -> DbResult<()> {
        sqlx::query("INSERT INTO sale_line_allocations (id, line_id, lot_id, quantity) VALUES (?1, ?2, ?3, ?4)")
            .bind(&allocation.id)
            .bind(&allocation.line_id)
            .bind(&allocation.lot_id)
            .bind(allocation.quantity)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Inserts a payment.
    pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(
            sale_id = %payment.sale_id,
            payment_id = %payment.id,
            method = payment.method.as_str(),
            amount_base_cents = payment.amount_base_cents,
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, sale_id, session_id, method, amount_cents, currency_code, exchange_rate,
                amount_base_cents, change_base_cents, status, reference, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(&payment.session_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.currency_code)
        .bind(payment.exchange_rate.to_string())
        .bind(payment.amount_base_cents)
        .bind(payment.change_base_cents)
        .bind(payment.status)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Status transitions
    // -------------------------------------------------------------------------

    /// Locks a pending sale by bumping `updated_at`.
    ///
    /// Returns the sale, or `None` if it is missing or no longer pending.
    pub async fn touch_pending(
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Sale>> {
        let sql = format!(
            "UPDATE sales SET updated_at = ?2 WHERE id = ?1 AND status = 'pending' RETURNING {SALE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Sale::try_from).transpose()
    }

    /// Pending → completed. False if the sale was not pending.
    pub async fn mark_completed(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET status = 'completed', completed_at = ?2, updated_at = ?2
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending or completed → cancelled.
    ///
    /// Returns the cancelled sale, or `None` when the sale is missing or
    /// already cancelled or refunded.
    pub async fn mark_cancelled(
        conn: &mut SqliteConnection,
        id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Sale>> {
        let sql = format!(
            r#"
            UPDATE sales
            SET status = 'cancelled', cancel_reason = ?2, cancelled_at = ?3, updated_at = ?3
            WHERE id = ?1 AND status IN ('pending', 'completed')
            RETURNING {SALE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .bind(reason)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Sale::try_from).transpose()
    }

    /// Moves a pending payment to `status`.
    ///
    /// Returns the updated payment, or `None` if it is missing or no longer
    /// pending.
    pub async fn settle_pending_payment(
        conn: &mut SqliteConnection,
        payment_id: &str,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Payment>> {
        let sql = format!(
            "UPDATE payments SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'pending' \
             RETURNING {PAYMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(payment_id)
            .bind(status)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Payment::try_from).transpose()
    }

    /// Marks every completed or pending payment of a sale refunded.
    ///
    /// Returns how many payments changed.
    pub async fn refund_payments(conn: &mut SqliteConnection, sale_id: &str, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'refunded', updated_at = ?2
            WHERE sale_id = ?1 AND status IN ('completed', 'pending')
            "#,
        )
        .bind(sale_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
