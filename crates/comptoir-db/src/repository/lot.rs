//! # Stock Lot Repository
//!
//! Lots, their quantity updates, and the append-only movement journal.
//!
//! ## Compare-and-Swap Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two checkouts race for the last 2 units of lot L000003                 │
//! │                                                                         │
//! │  A: UPDATE stock_lots SET current_quantity = current_quantity - 2       │
//! │     WHERE id = ? AND current_quantity >= 2 AND status = 'available'     │
//! │     → 1 row  (5 → 3)                                                    │
//! │                                                                         │
//! │  B: same statement, after A commits                                     │
//! │     → 1 row  (3 → 1)                                                    │
//! │                                                                         │
//! │  C: asks for 2 when 1 is left                                           │
//! │     → 0 rows, caller sees None and never drives the lot negative        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The status column follows the quantity in the same statement: a lot that
//! reaches zero becomes `depleted`, one that gets stock back becomes
//! `available`, and a `blocked` lot stays blocked either way.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use comptoir_core::{LotStatus, MovementType, ReferenceType, StockLot, StockMovement};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    id: String,
    lot_number: String,
    product_id: String,
    initial_quantity: i64,
    current_quantity: i64,
    unit_cost_cents: i64,
    received_at: DateTime<Utc>,
    expiry_at: Option<DateTime<Utc>>,
    customs_ref: Option<String>,
    status: LotStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LotRow> for StockLot {
    fn from(row: LotRow) -> Self {
        StockLot {
            id: row.id,
            lot_number: row.lot_number,
            product_id: row.product_id,
            initial_quantity: row.initial_quantity,
            current_quantity: row.current_quantity,
            unit_cost_cents: row.unit_cost_cents,
            received_at: row.received_at,
            expiry_at: row.expiry_at,
            customs_ref: row.customs_ref,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    product_id: String,
    lot_id: String,
    movement_type: MovementType,
    quantity: i64,
    previous_quantity: i64,
    new_quantity: i64,
    reference_type: ReferenceType,
    reference_id: Option<String>,
    reason: Option<String>,
    actor_id: String,
    occurred_at: DateTime<Utc>,
}

impl From<MovementRow> for StockMovement {
    fn from(row: MovementRow) -> Self {
        StockMovement {
            id: row.id,
            product_id: row.product_id,
            lot_id: row.lot_id,
            movement_type: row.movement_type,
            quantity: row.quantity,
            previous_quantity: row.previous_quantity,
            new_quantity: row.new_quantity,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            reason: row.reason,
            actor_id: row.actor_id,
            occurred_at: row.occurred_at,
        }
    }
}

const SELECT_LOT: &str = r#"
    SELECT id, lot_number, product_id, initial_quantity, current_quantity, unit_cost_cents,
           received_at, expiry_at, customs_ref, status, created_at, updated_at
    FROM stock_lots
"#;

const SELECT_MOVEMENT: &str = r#"
    SELECT id, product_id, lot_id, movement_type, quantity, previous_quantity, new_quantity,
           reference_type, reference_id, reason, actor_id, occurred_at
    FROM stock_movements
"#;

/// Status recomputed from the post-update quantity; `?2` is the delta.
const STATUS_AFTER_DELTA: &str = r#"
    CASE
        WHEN status = 'blocked' THEN 'blocked'
        WHEN current_quantity + ?2 = 0 THEN 'depleted'
        ELSE 'available'
    END
"#;

// =============================================================================
// Output Types
// =============================================================================

/// Quantity snapshot around one lot update, recorded on the movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityChange {
    pub product_id: String,
    pub previous: i64,
    pub new: i64,
}

impl QuantityChange {
    fn from_returning((product_id, new): (String, i64), delta: i64) -> Self {
        QuantityChange {
            product_id,
            previous: new - delta,
            new,
        }
    }
}

// =============================================================================
// Lot Repository
// =============================================================================

/// Repository for stock lots.
///
/// ## Usage
/// ```rust,ignore
/// // Read side
/// let lots = db.lots().for_product(&product_id).await?;
///
/// // Inside a use case
/// match LotRepository::take(&mut tx, &lot_id, 2, now).await? {
///     Some(change) => { /* append a sale movement */ }
///     None => { /* lost the race, retry the transaction */ }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LotRepository {
    pool: SqlitePool,
}

impl LotRepository {
    /// Creates a new LotRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LotRepository { pool }
    }

    /// Gets a lot by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<StockLot>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// All lots of a product, oldest receipt first, any status.
    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<StockLot>> {
        let sql = format!("{SELECT_LOT} WHERE product_id = ?1 ORDER BY received_at, created_at, rowid");
        let rows = sqlx::query_as::<_, LotRow>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(StockLot::from).collect())
    }

    /// Sum of `current_quantity` over non-blocked lots.
    pub async fn current_stock(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::stock_on_hand(&mut conn, product_id).await
    }

    /// Movements of one lot, oldest first.
    pub async fn movements_for_lot(&self, lot_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!("{SELECT_MOVEMENT} WHERE lot_id = ?1 ORDER BY occurred_at, rowid");
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(lot_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(StockMovement::from).collect())
    }

    // -------------------------------------------------------------------------
    // Connection-scoped operations
    // -------------------------------------------------------------------------

    /// Gets a lot on the caller's connection.
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<StockLot>> {
        let sql = format!("{SELECT_LOT} WHERE id = ?1");
        let row = sqlx::query_as::<_, LotRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(StockLot::from))
    }

    /// Inserts a new lot.
    pub async fn insert(conn: &mut SqliteConnection, lot: &StockLot) -> DbResult<()> {
        debug!(lot_id = %lot.id, lot_number = %lot.lot_number, quantity = lot.initial_quantity, "Inserting lot");

        sqlx::query(
            r#"
            INSERT INTO stock_lots (
                id, lot_number, product_id, initial_quantity, current_quantity, unit_cost_cents,
                received_at, expiry_at, customs_ref, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&lot.id)
        .bind(&lot.lot_number)
        .bind(&lot.product_id)
        .bind(lot.initial_quantity)
        .bind(lot.current_quantity)
        .bind(lot.unit_cost_cents)
        .bind(lot.received_at)
        .bind(lot.expiry_at)
        .bind(&lot.customs_ref)
        .bind(lot.status)
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Lots that can be allocated from: available with stock on hand.
    pub async fn allocatable(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Vec<StockLot>> {
        let sql = format!(
            "{SELECT_LOT} WHERE product_id = ?1 AND status = 'available' AND current_quantity > 0 \
             ORDER BY received_at, created_at, rowid"
        );
        let rows = sqlx::query_as::<_, LotRow>(&sql)
            .bind(product_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.into_iter().map(StockLot::from).collect())
    }

    /// Stock on hand on the caller's connection.
    pub async fn stock_on_hand(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(current_quantity), 0)
            FROM stock_lots
            WHERE product_id = ?1 AND status != 'blocked'
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(total)
    }

    /// Takes `quantity` units from an available lot.
    ///
    /// Returns `None` when the lot is missing, not available, or holds less
    /// than `quantity`. Nothing is written in that case.
    pub async fn take(
        conn: &mut SqliteConnection,
        lot_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<QuantityChange>> {
        let sql = format!(
            r#"
            UPDATE stock_lots
            SET current_quantity = current_quantity + ?2,
                status = {STATUS_AFTER_DELTA},
                updated_at = ?3
            WHERE id = ?1 AND status = 'available' AND current_quantity + ?2 >= 0
            RETURNING product_id, current_quantity
            "#
        );

        let row: Option<(String, i64)> = sqlx::query_as(&sql)
            .bind(lot_id)
            .bind(-quantity)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|r| QuantityChange::from_returning(r, -quantity)))
    }

    /// Applies a signed delta to a lot in any status.
    ///
    /// Returns `None` when the lot is missing or the result would break
    /// `0 ≤ current ≤ initial`.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        lot_id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<QuantityChange>> {
        let sql = format!(
            r#"
            UPDATE stock_lots
            SET current_quantity = current_quantity + ?2,
                status = {STATUS_AFTER_DELTA},
                updated_at = ?3
            WHERE id = ?1
              AND current_quantity + ?2 >= 0
              AND current_quantity + ?2 <= initial_quantity
            RETURNING product_id, current_quantity
            "#
        );

        let row: Option<(String, i64)> = sqlx::query_as(&sql)
            .bind(lot_id)
            .bind(delta)
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(|r| QuantityChange::from_returning(r, delta)))
    }

    /// Blocks a lot. Idempotent; false if the lot is unknown.
    pub async fn block(conn: &mut SqliteConnection, lot_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE stock_lots SET status = 'blocked', updated_at = ?2 WHERE id = ?1")
            .bind(lot_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Unblocks a lot, restoring the status its quantity implies.
    pub async fn unblock(conn: &mut SqliteConnection, lot_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stock_lots
            SET status = CASE WHEN current_quantity = 0 THEN 'depleted' ELSE 'available' END,
                updated_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(lot_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Movement Journal
// =============================================================================

/// Append-only stock movement journal.
///
/// Triggers reject UPDATE and DELETE on `stock_movements`; this type only
/// ever inserts and reads.
pub struct MovementRepository;

impl MovementRepository {
    /// Appends one movement.
    pub async fn append(conn: &mut SqliteConnection, movement: &StockMovement) -> DbResult<()> {
        debug!(
            lot_id = %movement.lot_id,
            movement_type = ?movement.movement_type,
            quantity = movement.quantity,
            "Appending stock movement"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, lot_id, movement_type, quantity, previous_quantity, new_quantity,
                reference_type, reference_id, reason, actor_id, occurred_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(&movement.lot_id)
        .bind(movement.movement_type)
        .bind(movement.quantity)
        .bind(movement.previous_quantity)
        .bind(movement.new_quantity)
        .bind(movement.reference_type)
        .bind(&movement.reference_id)
        .bind(&movement.reason)
        .bind(&movement.actor_id)
        .bind(movement.occurred_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ConstraintViolation { message } => DbError::ConstraintViolation {
                message: format!("movement {}: {}", movement.id, message),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Movements recorded against one business document.
    pub async fn for_reference(
        conn: &mut SqliteConnection,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!("{SELECT_MOVEMENT} WHERE reference_type = ?1 AND reference_id = ?2 ORDER BY occurred_at, rowid");
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(reference_type)
            .bind(reference_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rows.into_iter().map(StockMovement::from).collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
