//! # Seed Data Generator
//!
//! Populates a Comptoir database with currencies, priced products and
//! received stock lots for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in comptoir.toml (or the platform default)
//! cargo run -p comptoir-engine --bin comptoir-seed
//!
//! # Specify a config file or database path
//! cargo run -p comptoir-engine --bin comptoir-seed -- --config ./comptoir.toml
//! cargo run -p comptoir-engine --bin comptoir-seed -- --db ./data/comptoir.db
//! ```
//!
//! ## Generated Data
//! - Currencies: the base currency at rate 1, EUR and USD
//! - Products: staples priced in the base currency, some also in EUR
//! - Lots: two receipts per product a week apart, so FIFO has a choice

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;

use comptoir_core::Actor;
use comptoir_db::NewProduct;
use comptoir_engine::{init_tracing, Engine, EngineConfig, ReceiptRequest};

/// (sku, name, tax bps, base price, EUR price, unit cost)
const PRODUCTS: &[(&str, &str, u32, i64, Option<i64>, i64)] = &[
    ("RIZ-25", "Riz parfumé 25 kg", 0, 1_850_000, None, 1_400_000),
    ("HUI-5", "Huile végétale 5 L", 1800, 650_000, Some(1_000), 480_000),
    ("SUC-1", "Sucre en morceaux 1 kg", 1800, 90_000, None, 62_000),
    ("LAI-400", "Lait en poudre 400 g", 1800, 250_000, Some(400), 180_000),
    ("CAF-250", "Café moulu 250 g", 1800, 175_000, Some(275), 120_000),
    ("SAV-6", "Savon de Marseille x6", 1800, 120_000, None, 75_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Comptoir POS Seed Data Generator");
                println!();
                println!("Usage: comptoir-seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Configuration file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path, overrides the configuration");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    let mut config = EngineConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("🌱 Comptoir POS Seed Data Generator");
    println!("===================================");
    println!("Database: {}", config.database.path.display());
    println!("Base currency: {}", config.base_currency());
    println!();

    let engine = Engine::connect(config).await?;
    let actor = Actor::system();
    let base = engine.config().base_currency().to_string();

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Currencies
    engine.set_currency(&base, "Franc CFA", Decimal::ONE, true).await?;
    engine.set_currency("EUR", "Euro", Decimal::new(655_957, 3), true).await?;
    engine.set_currency("USD", "US Dollar", Decimal::new(600, 0), true).await?;
    println!("✓ Currencies: {}", engine.converter().await?.codes().join(", "));

    // Products and lots
    let start = std::time::Instant::now();
    let received_early = Utc::now() - Duration::days(14);
    let received_late = Utc::now() - Duration::days(7);
    let mut generated = 0;

    for (sku, name, tax_rate_bps, base_price, eur_price, unit_cost) in PRODUCTS {
        let mut prices = vec![(base.clone(), *base_price)];
        if let Some(eur) = eur_price {
            prices.push(("EUR".to_string(), *eur));
        }

        let new = NewProduct {
            sku: sku.to_string(),
            name: name.to_string(),
            tax_rate_bps: *tax_rate_bps,
            min_stock: 5,
            max_stock: Some(200),
            prices,
        };

        let product = match engine.db().products().create(&new).await {
            Ok(product) => product,
            Err(e) if e.is_unique_on("products.sku") => {
                println!("⚠ {} already exists, skipping", sku);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        for (received_at, quantity) in [(received_early, 10), (received_late, 25)] {
            let mut receipt = ReceiptRequest::new(&product.id, quantity, *unit_cost);
            receipt.received_at = Some(received_at);
            engine.ledger().receive(receipt, &actor).await?;
        }

        generated += 1;
        println!("  {} {} → stock {}", sku, name, engine.ledger().current_stock(&product.id).await?);
    }

    println!();
    println!("✓ Seeded {} products in {:?}", generated, start.elapsed());

    engine.close().await;
    Ok(())
}
