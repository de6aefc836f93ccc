//! # Product Repository
//!
//! Read access to products and their per-currency prices.
//!
//! Products belong to the catalog collaborator. The settlement core reads
//! them to price lines; `create` and `set_price` exist for seeding and
//! for the catalog's own use.
//!
//! ## Price Lookup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products                      product_prices                           │
//! │  ┌──────────┬──────────┐       ┌──────────┬──────┬─────────────┐        │
//! │  │ id       │ RICE-5KG │ ◄──── │ p1       │ XOF  │ 350000      │        │
//! │  │ tax_bps  │ 1800     │       │ p1       │ EUR  │ 540         │        │
//! │  └──────────┴──────────┘       └──────────┴──────┴─────────────┘        │
//! │                                                                         │
//! │  Product { prices: {"EUR": 540, "XOF": 350000}, .. }                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use comptoir_core::Product;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    sku: String,
    name: String,
    tax_rate_bps: i64,
    min_stock: i64,
    max_stock: Option<i64>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, prices: BTreeMap<String, i64>) -> Product {
        Product {
            id: self.id,
            sku: self.sku,
            name: self.name,
            prices,
            tax_rate_bps: self.tax_rate_bps.clamp(0, 10_000) as u32,
            min_stock: self.min_stock,
            max_stock: self.max_stock,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const SELECT_PRODUCT: &str = r#"
    SELECT id, sku, name, tax_rate_bps, min_stock, max_stock, is_active, created_at, updated_at
    FROM products
"#;

// =============================================================================
// Input / Output Types
// =============================================================================

/// Fields needed to create a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub tax_rate_bps: u32,
    pub min_stock: i64,
    pub max_stock: Option<i64>,
    /// `(currency_code, price_cents)`
    pub prices: Vec<(String, i64)>,
}

/// A product at or below its low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LowStockRow {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub min_stock: i64,
    pub current_stock: i64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let product = db.products().get(&product_id).await?;
/// let price = product.and_then(|p| p.price_in("XOF"));
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product with its prices in one transaction.
    pub async fn create(&self, new: &NewProduct) -> DbResult<Product> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(id = %id, sku = %new.sku, "Creating product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, tax_rate_bps, min_stock, max_stock, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(&new.sku)
        .bind(&new.name)
        .bind(new.tax_rate_bps as i64)
        .bind(new.min_stock)
        .bind(new.max_stock)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, new.sku.clone()),
            other => other,
        })?;

        for (code, cents) in &new.prices {
            Self::upsert_price(&mut tx, &id, code, *cents).await?;
        }

        let product = Self::find(&mut tx, &id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &id))?;

        tx.commit().await?;
        Ok(product)
    }

    /// Sets a product's price in one currency.
    pub async fn set_price(&self, product_id: &str, currency_code: &str, price_cents: i64) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_price(&mut conn, product_id, currency_code, price_cents).await
    }

    /// Gets a product by ID, with prices.
    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Products whose non-blocked stock is at or below `min_stock`.
    pub async fn low_stock(&self) -> DbResult<Vec<LowStockRow>> {
        let rows = sqlx::query_as::<_, LowStockRow>(
            r#"
            SELECT
                p.id AS product_id,
                p.sku,
                p.name,
                p.min_stock,
                COALESCE(SUM(CASE WHEN l.status != 'blocked' THEN l.current_quantity ELSE 0 END), 0) AS current_stock
            FROM products p
            LEFT JOIN stock_lots l ON l.product_id = p.id
            WHERE p.is_active = 1
            GROUP BY p.id
            HAVING current_stock <= p.min_stock
            ORDER BY p.sku
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Gets a product on the caller's connection.
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("{SELECT_PRODUCT} WHERE id = ?1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let prices: Vec<(String, i64)> = sqlx::query_as(
            "SELECT currency_code, price_cents FROM product_prices WHERE product_id = ?1",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(row.into_product(prices.into_iter().collect())))
    }

    /// Bumps `updated_at`, taking the writer lock; false if the product is unknown.
    pub async fn touch(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_price(
        conn: &mut SqliteConnection,
        product_id: &str,
        currency_code: &str,
        price_cents: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_prices (product_id, currency_code, price_cents)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(product_id, currency_code) DO UPDATE SET price_cents = excluded.price_cents
            "#,
        )
        .bind(product_id)
        .bind(currency_code)
        .bind(price_cents)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use comptoir_core::Money;
    use rust_decimal_macros::dec;

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.currencies().upsert("XOF", "Franc CFA", dec!(1), true).await.unwrap();
        db.currencies().upsert("EUR", "Euro", dec!(655.957), true).await.unwrap();
        db
    }

    fn rice() -> NewProduct {
        NewProduct {
            sku: "RICE-5KG".to_string(),
            name: "Rice 5kg".to_string(),
            tax_rate_bps: 1800,
            min_stock: 10,
            max_stock: None,
            prices: vec![("XOF".to_string(), 350_000)],
        }
    }

    #[tokio::test]
    async fn test_create_and_get_with_prices() {
        let db = setup().await;
        let repo = db.products();

        let created = repo.create(&rice()).await.unwrap();
        repo.set_price(&created.id, "EUR", 540).await.unwrap();

        let product = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(product.sku, "RICE-5KG");
        assert_eq!(product.price_in("XOF"), Some(Money::from_major(3500)));
        assert_eq!(product.price_in("EUR"), Some(Money::from_cents(540)));
        assert_eq!(product.tax_rate_bps, 1800);
    }

    #[tokio::test]
    async fn test_duplicate_sku() {
        let db = setup().await;
        db.products().create(&rice()).await.unwrap();

        let err = db.products().create(&rice()).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { value, .. } if value == "RICE-5KG"));
    }

    #[tokio::test]
    async fn test_low_stock_without_lots() {
        let db = setup().await;
        db.products().create(&rice()).await.unwrap();

        let low = db.products().low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].current_stock, 0);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = setup().await;
        assert!(db.products().get("missing").await.unwrap().is_none());
    }
}
