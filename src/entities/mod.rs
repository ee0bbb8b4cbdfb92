pub mod bill;
pub mod bill_item;
pub mod product;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Largest amount the `DECIMAL(19, 4)` money columns can hold.
pub const MAX_AMOUNT: Decimal = dec!(999999999999999.9999);
