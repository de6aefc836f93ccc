//! # Currency Repository
//!
//! The exchange-rate table. Rates are maintained by an external
//! collaborator; the engine only reads them, once per transaction, into a
//! `CurrencyConverter` snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::parse_decimal;
use crate::error::DbResult;
use comptoir_core::Currency;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CurrencyRow {
    code: String,
    name: String,
    rate_to_base: String,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CurrencyRow> for Currency {
    type Error = crate::error::DbError;

    fn try_from(row: CurrencyRow) -> Result<Self, Self::Error> {
        Ok(Currency {
            rate_to_base: parse_decimal("currencies.rate_to_base", &row.rate_to_base)?,
            code: row.code,
            name: row.name,
            is_active: row.is_active,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for currency and rate operations.
#[derive(Debug, Clone)]
pub struct CurrencyRepository {
    pool: SqlitePool,
}

impl CurrencyRepository {
    /// Creates a new CurrencyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CurrencyRepository { pool }
    }

    /// Lists active currencies (`listActiveCurrencies` for collaborators).
    pub async fn list_active(&self) -> DbResult<Vec<Currency>> {
        let mut conn = self.pool.acquire().await?;
        Self::active(&mut conn).await
    }

    /// Gets one currency by code, active or not.
    pub async fn get(&self, code: &str) -> DbResult<Option<Currency>> {
        let row = sqlx::query_as::<_, CurrencyRow>(
            "SELECT code, name, rate_to_base, is_active, updated_at FROM currencies WHERE code = ?1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Currency::try_from).transpose()
    }

    /// Inserts or updates a currency's rate.
    pub async fn upsert(&self, code: &str, name: &str, rate_to_base: Decimal, is_active: bool) -> DbResult<()> {
        debug!(code = %code, rate = %rate_to_base, "Upserting currency");

        sqlx::query(
            r#"
            INSERT INTO currencies (code, name, rate_to_base, is_active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                rate_to_base = excluded.rate_to_base,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(rate_to_base.to_string())
        .bind(is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Active currencies, read on the caller's connection.
    pub async fn active(conn: &mut SqliteConnection) -> DbResult<Vec<Currency>> {
        let rows = sqlx::query_as::<_, CurrencyRow>(
            r#"
            SELECT code, name, rate_to_base, is_active, updated_at
            FROM currencies
            WHERE is_active = 1
            ORDER BY code
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Currency::try_from).collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use comptoir_core::{CurrencyConverter, Money};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_upsert_and_snapshot() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.currencies();

        repo.upsert("XOF", "Franc CFA", dec!(1), true).await.unwrap();
        repo.upsert("EUR", "Euro", dec!(655.957), true).await.unwrap();
        repo.upsert("GHS", "Cedi", dec!(40), false).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 2);

        let eur = repo.get("EUR").await.unwrap().unwrap();
        assert_eq!(eur.rate_to_base, dec!(655.957));

        let mut conn = db.pool().acquire().await.unwrap();
        let currencies = CurrencyRepository::active(&mut conn).await.unwrap();
        let fx = CurrencyConverter::new("XOF", &currencies).unwrap();
        assert_eq!(
            fx.convert_to_base(Money::from_major(10), "EUR").unwrap(),
            Money::from_cents(655_957)
        );
        assert!(fx.rate("GHS").is_err());
    }

    #[tokio::test]
    async fn test_upsert_updates_rate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.currencies();

        repo.upsert("USD", "US Dollar", dec!(600), true).await.unwrap();
        repo.upsert("USD", "US Dollar", dec!(605.25), true).await.unwrap();

        assert_eq!(repo.get("USD").await.unwrap().unwrap().rate_to_base, dec!(605.25));
    }
}
