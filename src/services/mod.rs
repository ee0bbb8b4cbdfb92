// Bill book: transactional bill creation and bill history
pub mod billing;

// Stock book: product catalog and stock levels
pub mod stock;

pub use billing::{BillLine, BillWithItems, BillingService, NewBill};
pub use stock::{ProductInput, StockService, StockStatus};
