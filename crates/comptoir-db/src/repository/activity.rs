//! # Activity Log Repository
//!
//! Append-only audit trail of business events.
//!
//! ## Same-Transaction Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Activity Entry Written With the Change               │
//! │                                                                         │
//! │  USE CASE (e.g., cancel sale)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   SINGLE TRANSACTION                            │    │
//! │  │                                                                 │    │
//! │  │  1. UPDATE sales SET status = 'cancelled' WHERE id = ?          │    │
//! │  │  2. UPDATE stock_lots ... / INSERT INTO stock_movements ...     │    │
//! │  │  3. INSERT INTO activity_log (kind, entity_type, entity_id,     │    │
//! │  │        actor_id, payload) VALUES ('sale_cancelled', 'sale', ?)  │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the change and its log entry land together or not at all      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `payload` is the JSON of an [`ActivityEntry`]: the typed event under its
//! `kind` tag plus the extension map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comptoir_core::ActivityEntry;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    id: String,
    actor_id: String,
    payload: String,
    created_at: DateTime<Utc>,
}

/// One stored activity entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub actor_id: String,
    pub entry: ActivityEntry,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = DbError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        Ok(ActivityRecord {
            entry: serde_json::from_str(&row.payload).map_err(|e| DbError::decode("activity_log.payload", e))?,
            id: row.id,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the activity log.
#[derive(Debug, Clone)]
pub struct ActivityRepository {
    pool: SqlitePool,
}

impl ActivityRepository {
    /// Creates a new ActivityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActivityRepository { pool }
    }

    /// Appends an entry on the caller's connection.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let entry = ActivityEntry::from(ActivityEvent::LotBlocked { lot_id: lot.id.clone() })
    ///     .with("source", "back-office");
    /// ActivityRepository::append(&mut tx, &entry, &actor.id).await?;
    /// ```
    pub async fn append(conn: &mut SqliteConnection, entry: &ActivityEntry, actor_id: &str) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        let (entity_type, entity_id) = entry.event.subject();
        let payload = serde_json::to_string(entry).map_err(|e| DbError::Internal(e.to_string()))?;

        debug!(
            kind = entry.event.kind(),
            entity_type = entity_type,
            entity_id = %entity_id,
            "Appending activity"
        );

        sqlx::query(
            r#"
            INSERT INTO activity_log (id, kind, entity_type, entity_id, actor_id, payload, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&id)
        .bind(entry.event.kind())
        .bind(entity_type)
        .bind(entity_id)
        .bind(actor_id)
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    /// Entries about one entity, oldest first.
    pub async fn for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<ActivityRecord>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, actor_id, payload, created_at
            FROM activity_log
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRecord::try_from).collect()
    }

    /// Number of entries of one kind.
    pub async fn count_kind(&self, kind: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activity_log WHERE kind = ?1")
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use comptoir_core::ActivityEvent;

    #[tokio::test]
    async fn test_append_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let entry = ActivityEntry::from(ActivityEvent::LotBlocked {
            lot_id: "lot-1".to_string(),
        })
        .with("source", "back-office");

        let mut tx = db.begin().await.unwrap();
        ActivityRepository::append(&mut tx, &entry, "sup-1").await.unwrap();
        tx.commit().await.unwrap();

        let records = db.activity().for_entity("stock_lot", "lot-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry, entry);
        assert_eq!(records[0].actor_id, "sup-1");
        assert_eq!(db.activity().count_kind("lot_blocked").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rolled_back_entry_is_absent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let entry = ActivityEntry::from(ActivityEvent::SessionValidated {
            session_id: "s1".to_string(),
        });
        ActivityRepository::append(&mut tx, &entry, "sup-1").await.unwrap();
        tx.rollback().await.unwrap();

        assert!(db.activity().for_entity("cash_session", "s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_is_append_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let entry = ActivityEntry::from(ActivityEvent::LotUnblocked {
            lot_id: "lot-1".to_string(),
        });
        ActivityRepository::append(&mut conn, &entry, "sup-1").await.unwrap();

        let err = sqlx::query("DELETE FROM activity_log").execute(&mut *conn).await.unwrap_err();
        assert!(matches!(DbError::from(err), DbError::ConstraintViolation { .. }));
    }
}
