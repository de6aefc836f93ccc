//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use tempfile::TempDir;

use comptoir_core::{Actor, AllocationPolicy, CashSession, Money, OversellPolicy, Product, StockLot};
use comptoir_db::{Database, DbConfig, NewProduct};
use comptoir_engine::{Engine, EngineConfig, ReceiptRequest};

pub fn cashier() -> Actor {
    Actor::new("cashier-1", "cashier")
}

pub fn supervisor() -> Actor {
    Actor::new("supervisor-1", "supervisor")
}

/// Engine over a fresh in-memory database with XOF (base) and EUR.
pub async fn engine() -> Engine {
    engine_with(EngineConfig::default()).await
}

pub async fn engine_with(config: EngineConfig) -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = Engine::new(db, config);
    seed_currencies(&engine).await;
    engine
}

pub fn config_with(allocation: AllocationPolicy, oversell: OversellPolicy) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.inventory.allocation_policy = allocation;
    config.inventory.oversell_policy = oversell;
    config
}

/// Engine over a database file, so several connections write concurrently.
///
/// Keep the returned directory alive for the duration of the test.
pub async fn file_engine(max_connections: u32) -> (Engine, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig::default();
    config.database.path = dir.path().join("comptoir.db");
    config.database.max_connections = max_connections;
    config.retry.max_attempts = 20;
    config.retry.initial_backoff_ms = 5;
    config.retry.max_backoff_ms = 50;

    let db = Database::new(config.db_config().busy_timeout(Duration::from_secs(10)))
        .await
        .unwrap();
    let engine = Engine::new(db, config);
    seed_currencies(&engine).await;
    (engine, dir)
}

async fn seed_currencies(engine: &Engine) {
    engine.set_currency("XOF", "Franc CFA", dec!(1), true).await.unwrap();
    engine.set_currency("EUR", "Euro", dec!(655.957), true).await.unwrap();
}

/// Product priced in XOF only.
pub async fn product(engine: &Engine, sku: &str, price: Money, tax_rate_bps: u32) -> Product {
    engine
        .db()
        .products()
        .create(&NewProduct {
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            tax_rate_bps,
            min_stock: 0,
            max_stock: None,
            prices: vec![("XOF".to_string(), price.cents())],
        })
        .await
        .unwrap()
}

pub async fn receive(engine: &Engine, product_id: &str, quantity: i64) -> StockLot {
    engine
        .ledger()
        .receive(ReceiptRequest::new(product_id, quantity, 10_000), &cashier())
        .await
        .unwrap()
}

pub async fn receive_at(engine: &Engine, product_id: &str, quantity: i64, received_at: DateTime<Utc>) -> StockLot {
    let mut request = ReceiptRequest::new(product_id, quantity, 10_000);
    request.received_at = Some(received_at);
    engine.ledger().receive(request, &cashier()).await.unwrap()
}

pub async fn open_session(engine: &Engine, register_id: &str, opening: Money) -> CashSession {
    engine
        .sessions()
        .open_session(register_id, opening, &cashier())
        .await
        .unwrap()
}

pub async fn lot_quantity(engine: &Engine, lot_id: &str) -> i64 {
    engine.ledger().get_lot(lot_id).await.unwrap().current_quantity
}
