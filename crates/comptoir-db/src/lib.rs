//! # comptoir-db: Database Layer for Comptoir POS
//!
//! This crate provides database access for the Comptoir POS settlement core.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Comptoir POS Data Flow                           │
//! │                                                                         │
//! │  comptoir-engine use case (create_sale, cancel, close_session)          │
//! │       │  owns the transaction                                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     comptoir-db (THIS CRATE)                    │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │    │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │    │    │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │    │    │
//! │  │   │               │    │ LotRepo       │    │ 001_initial  │    │    │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │ 002_append_  │    │    │
//! │  │   │ begin()       │    │ SessionRepo   │    │     only     │    │    │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     SQLite Database (WAL)                       │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comptoir_db::{Database, DbConfig, LotRepository};
//!
//! let db = Database::new(DbConfig::new("comptoir.db")).await?;
//!
//! // Reads
//! let lots = db.lots().for_product(&product_id).await?;
//!
//! // Writes, inside a transaction
//! let mut tx = db.begin().await?;
//! LotRepository::take(&mut tx, &lot_id, 2, Utc::now()).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::activity::{ActivityRecord, ActivityRepository};
pub use repository::currency::CurrencyRepository;
pub use repository::lot::{LotRepository, MovementRepository, QuantityChange};
pub use repository::product::{LowStockRow, NewProduct, ProductRepository};
pub use repository::sale::{SaleDetails, SaleRepository};
pub use repository::session::SessionRepository;
pub use repository::sequence;
