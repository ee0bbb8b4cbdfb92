//! Seed data script - fills the stock book with a small demo catalog
//!
//! Run with: cargo run --bin seed-data
//!
//! Products that already exist (by name) are left untouched, so the
//! script can be run repeatedly.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use tracing::{info, warn};

use ramp_api::{
    db,
    errors::ServiceError,
    events::EventSender,
    services::{ProductInput, StockService},
};

const CATALOG: &[(&str, Decimal, i32)] = &[
    ("Blue Ballpoint Pen", dec!(0.75), 240),
    ("A4 Copy Paper (500 sheets)", dec!(5.49), 40),
    ("Stapler", dec!(8.90), 12),
    ("Staples No. 10", dec!(1.20), 3),
    ("Yellow Highlighter", dec!(1.10), 0),
    ("Spiral Notebook", dec!(2.35), 75),
    ("Desk Organizer", dec!(14.99), 4),
    ("Whiteboard Marker Set", dec!(6.50), 18),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== RAMP Seed Data ===");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://ramp.db?mode=rwc".to_string());
    info!("Connecting to database: {}", database_url);

    let pool = db::establish_connection(&database_url).await?;
    db::run_migrations(&pool).await?;
    let pool = Arc::new(pool);

    // Nobody listens to catalog events here
    let (tx, _rx) = mpsc::channel(CATALOG.len() * 2);
    let stock = StockService::new(pool.clone(), Arc::new(EventSender::new(tx)), 5);

    let mut created = 0usize;
    for (name, price, quantity) in CATALOG {
        match stock
            .create_product(ProductInput::new(*name, *price, *quantity))
            .await
        {
            Ok(product) => {
                created += 1;
                info!(
                    "  {} x{} @ {} ({:?})",
                    product.name,
                    product.quantity,
                    product.price,
                    stock.status_of(&product)
                );
            }
            Err(ServiceError::Conflict(_)) => {
                warn!("  {} already exists, skipping", name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Created {} of {} products", created, CATALOG.len());
    info!("");
    info!("Try these API calls:");
    info!("  curl http://localhost:8080/api/v1/products");
    info!("  curl http://localhost:8080/api/v1/products/low-stock");
    info!("  curl http://localhost:8080/api/v1/bills");
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");

    Ok(())
}
