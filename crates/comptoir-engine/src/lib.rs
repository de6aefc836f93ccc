//! # comptoir-engine: Use Cases for Comptoir POS
//!
//! Runs every mutation of the settlement core inside one SQLite
//! transaction, retried as a whole on lock contention.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Engine (facade)                                │
//! │                                                                         │
//! │   settlement()          cancellation()        sessions()     ledger()   │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────┐  ┌────────┐ │
//! │  │ SaleSettlement   │  │ SaleCancellation │  │ CashSession│  │ Stock  │ │
//! │  │ Engine           │  │ Handler          │  │ Service    │  │ Lot    │ │
//! │  │                  │  │                  │  │            │  │ Ledger │ │
//! │  └───┬──────────┬───┘  └────────┬─────────┘  └─────┬──────┘  └───┬────┘ │
//! │      │ allocate │ rates         │ release          │             │      │
//! │      ▼          ▼               ▼                  ▼             ▼      │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │ comptoir-db: repositories on the caller's transaction            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │ comptoir-core: money, conversion, plans, pricing, reconciliation │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Layered configuration (defaults, TOML, environment)
//! - [`error`] - Engine error taxonomy
//! - [`retry`] - Whole-transaction retry on transient failures
//! - [`ledger`] - Stock lot ledger
//! - [`session`] - Cash session lifecycle and reconciliation
//! - [`settlement`] - Sale creation and payments
//! - [`cancellation`] - Sale reversal
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comptoir_engine::{Engine, EngineConfig, SaleRequest, PaymentRequest};
//!
//! let engine = Engine::connect(EngineConfig::load(None)?).await?;
//! let session = engine.sessions().open_session("REG-1", Money::from_major(50_000), &cashier).await?;
//!
//! let outcome = engine
//!     .settlement()
//!     .create_sale(
//!         SaleRequest::new(&session.id, "XOF").line(&rice.id, 2).payment(PaymentRequest::cash(1_000_000)),
//!         &cashier,
//!     )
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cancellation;
pub mod config;
pub mod error;
pub mod ledger;
pub mod retry;
pub mod session;
pub mod settlement;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cancellation::{CancellationOutcome, SaleCancellationHandler};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use ledger::{ReceiptRequest, StockLotLedger, StockReference};
pub use retry::RetryPolicy;
pub use session::CashSessionService;
pub use settlement::{
    GatewayOutcome, LineRequest, LineShortfall, PaymentOutcome, PaymentRequest, SaleOutcome, SaleRequest,
    SaleSettlementEngine,
};

use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use comptoir_core::validation::{validate_currency_code, validate_required};
use comptoir_core::{Currency, CurrencyConverter, ValidationError};
use comptoir_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// All use cases over one database.
///
/// Cheap to clone: every service shares the same pool.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    config: EngineConfig,
    ledger: StockLotLedger,
    sessions: CashSessionService,
    settlement: SaleSettlementEngine,
    cancellation: SaleCancellationHandler,
}

impl Engine {
    /// Opens the configured database, runs migrations and builds the services.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        info!(
            path = %config.database.path.display(),
            base_currency = %config.base_currency(),
            "Engine connected"
        );
        Ok(Engine::new(db, config))
    }

    /// Builds the services over an existing database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let retry = config.retry_policy();
        let inventory = &config.inventory;

        Engine {
            ledger: StockLotLedger::new(db.clone(), inventory.allocation_policy, retry),
            sessions: CashSessionService::new(db.clone(), retry),
            settlement: SaleSettlementEngine::new(
                db.clone(),
                config.base_currency(),
                inventory.allocation_policy,
                inventory.oversell_policy,
                retry,
            ),
            cancellation: SaleCancellationHandler::new(db.clone(), retry),
            db,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &StockLotLedger {
        &self.ledger
    }

    pub fn sessions(&self) -> &CashSessionService {
        &self.sessions
    }

    pub fn settlement(&self) -> &SaleSettlementEngine {
        &self.settlement
    }

    pub fn cancellation(&self) -> &SaleCancellationHandler {
        &self.cancellation
    }

    // =========================================================================
    // Currencies
    // =========================================================================

    /// Creates or updates a currency rate.
    ///
    /// The base currency is pinned to rate 1 and cannot be deactivated.
    pub async fn set_currency(&self, code: &str, name: &str, rate_to_base: Decimal, is_active: bool) -> EngineResult<()> {
        validate_currency_code(code)?;
        validate_required("name", name)?;

        let is_base = code == self.config.base_currency();
        if is_base && (rate_to_base != Decimal::ONE || !is_active) {
            return Err(ValidationError::InvalidFormat {
                field: "rate_to_base".to_string(),
                reason: format!("base currency {code} must stay active at rate 1"),
            }
            .into());
        }
        if rate_to_base <= Decimal::ZERO {
            return Err(ValidationError::MustBePositive {
                field: "rate_to_base".to_string(),
            }
            .into());
        }

        self.db.currencies().upsert(code, name, rate_to_base, is_active).await?;
        info!(code = %code, rate = %rate_to_base, is_active, "Currency rate set");
        Ok(())
    }

    /// Active currencies, for collaborators that list them.
    pub async fn active_currencies(&self) -> EngineResult<Vec<Currency>> {
        Ok(self.db.currencies().list_active().await?)
    }

    /// A point-in-time snapshot of the active rate table.
    pub async fn converter(&self) -> EngineResult<CurrencyConverter> {
        let currencies = self.active_currencies().await?;
        Ok(CurrencyConverter::new(self.config.base_currency(), &currencies)?)
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

// =============================================================================
// Tracing
// =============================================================================

/// Installs the global fmt subscriber for binaries.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=comptoir_engine=trace` - Trace the engine only
/// - Default: `info,comptoir=debug,sqlx=warn`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,comptoir=debug,sqlx=warn"));

    // A second call (tests, embedding apps) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
