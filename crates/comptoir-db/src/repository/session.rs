//! # Cash Session Repository
//!
//! Register sessions and the cash figures they freeze at close.
//!
//! ## One Open Session per Register
//! ```text
//! CREATE UNIQUE INDEX idx_cash_sessions_one_open
//!     ON cash_sessions(register_id) WHERE status = 'open';
//!
//! open(REG-1) ──► INSERT ok
//! open(REG-1) ──► UNIQUE constraint failed: cash_sessions.register_id
//! close(s1)   ──► status = 'closed', the index no longer covers s1
//! open(REG-1) ──► INSERT ok
//! ```
//!
//! Status changes are compare-and-swap on the current status, so two
//! supervisors closing the same session cannot both succeed.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use comptoir_core::{CashSession, SessionStatus};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    register_id: String,
    operator_id: String,
    opening_cash_cents: i64,
    closing_cash_cents: Option<i64>,
    expected_cash_cents: Option<i64>,
    variance_cents: Option<i64>,
    status: SessionStatus,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    validated_at: Option<DateTime<Utc>>,
    validated_by: Option<String>,
}

impl From<SessionRow> for CashSession {
    fn from(row: SessionRow) -> Self {
        CashSession {
            id: row.id,
            register_id: row.register_id,
            operator_id: row.operator_id,
            opening_cash_cents: row.opening_cash_cents,
            closing_cash_cents: row.closing_cash_cents,
            expected_cash_cents: row.expected_cash_cents,
            variance_cents: row.variance_cents,
            status: row.status,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            validated_at: row.validated_at,
            validated_by: row.validated_by,
        }
    }
}

const SELECT_SESSION: &str = r#"
    SELECT id, register_id, operator_id, opening_cash_cents, closing_cash_cents,
           expected_cash_cents, variance_cents, status, opened_at, closed_at,
           validated_at, validated_by
    FROM cash_sessions
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for cash sessions.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Gets a session by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<CashSession>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// The open session of a register, if any.
    pub async fn current_for_register(&self, register_id: &str) -> DbResult<Option<CashSession>> {
        let sql = format!("{SELECT_SESSION} WHERE register_id = ?1 AND status = 'open'");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(register_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CashSession::from))
    }

    // -------------------------------------------------------------------------
    // Connection-scoped operations
    // -------------------------------------------------------------------------

    /// Gets a session on the caller's connection.
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<CashSession>> {
        let sql = format!("{SELECT_SESSION} WHERE id = ?1");
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(CashSession::from))
    }

    /// Inserts a new open session.
    ///
    /// Fails with `UniqueViolation` on `cash_sessions.register_id` when the
    /// register already has an open session.
    pub async fn insert(conn: &mut SqliteConnection, session: &CashSession) -> DbResult<()> {
        debug!(session_id = %session.id, register_id = %session.register_id, "Inserting cash session");

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, register_id, operator_id, opening_cash_cents, status, opened_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&session.id)
        .bind(&session.register_id)
        .bind(&session.operator_id)
        .bind(session.opening_cash_cents)
        .bind(session.status)
        .bind(session.opened_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves an open session to closed and records the counted cash.
    ///
    /// Returns the opening float, or `None` if the session was not open.
    pub async fn mark_closed(
        conn: &mut SqliteConnection,
        id: &str,
        closing_cash_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        let opening: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE cash_sessions
            SET status = 'closed', closing_cash_cents = ?2, closed_at = ?3
            WHERE id = ?1 AND status = 'open'
            RETURNING opening_cash_cents
            "#,
        )
        .bind(id)
        .bind(closing_cash_cents)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(opening)
    }

    /// Stores the reconciliation figures of a session being closed.
    pub async fn record_reconciliation(
        conn: &mut SqliteConnection,
        id: &str,
        expected_cash_cents: i64,
        variance_cents: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE cash_sessions SET expected_cash_cents = ?2, variance_cents = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(expected_cash_cents)
        .bind(variance_cents)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves a closed session to validated. False if it was not closed.
    pub async fn mark_validated(
        conn: &mut SqliteConnection,
        id: &str,
        validated_by: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cash_sessions
            SET status = 'validated', validated_at = ?3, validated_by = ?2
            WHERE id = ?1 AND status = 'closed'
            "#,
        )
        .bind(id)
        .bind(validated_by)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Net cash taken by a session: completed cash payments minus change.
    pub async fn net_cash_per_payment(conn: &mut SqliteConnection, session_id: &str) -> DbResult<Vec<i64>> {
        let amounts: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT amount_base_cents - change_base_cents
            FROM payments
            WHERE session_id = ?1 AND method = 'cash' AND status = 'completed'
            ORDER BY created_at, rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(amounts)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
