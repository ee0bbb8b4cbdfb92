pub mod bills;
pub mod common;
pub mod products;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{BillingService, StockService};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub stock: Arc<StockService>,
    pub billing: Arc<BillingService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let stock = Arc::new(StockService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.low_stock_threshold,
        ));
        let billing = Arc::new(BillingService::new(
            db_pool,
            event_sender,
            config.low_stock_threshold,
            config.bill_history_limit,
        ));

        Self { stock, billing }
    }
}
