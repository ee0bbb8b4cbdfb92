use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    db::DbPool,
    entities::{
        bill::{self, Entity as Bill},
        bill_item::{self, Entity as BillItem},
        product::{self, Entity as Product},
        MAX_AMOUNT,
    },
    errors::{FieldErrors, ServiceError},
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// One requested line: which product and how many units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct NewBill {
    pub items: Vec<BillLine>,
    /// Total the client computed; checked against the server total when present
    pub total_amount: Option<Decimal>,
}

/// A bill together with its lines in `sno` order
#[derive(Debug, Clone, PartialEq)]
pub struct BillWithItems {
    pub bill: bill::Model,
    pub items: Vec<bill_item::Model>,
}

/// Product row as read inside the bill transaction
struct PricedLine {
    product: product::Model,
    quantity: i32,
    total: Decimal,
}

/// `price × quantity`, refusing amounts the money columns cannot store.
fn line_total(name: &str, price: Decimal, quantity: i32) -> Result<Decimal, ServiceError> {
    price
        .checked_mul(Decimal::from(quantity))
        .filter(|total| *total <= MAX_AMOUNT)
        .ok_or_else(|| {
            ServiceError::field(
                "items",
                format!("Line total for {} exceeds the largest supported amount", name),
            )
        })
}

fn bill_total(priced: &[PricedLine]) -> Result<Decimal, ServiceError> {
    priced
        .iter()
        .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.total))
        .filter(|total| *total <= MAX_AMOUNT)
        .ok_or_else(|| {
            ServiceError::field(
                "total_amount",
                "Bill total exceeds the largest supported amount",
            )
        })
}

fn insufficient_stock(name: &str, available: i32) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "Insufficient stock for {}. Available: {}",
        name, available
    ))
}

/// Checks the request shape and folds repeated products into one line,
/// keeping the position of the first occurrence.
pub fn merge_lines(items: &[BillLine]) -> Result<Vec<BillLine>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::field(
            "items",
            "Bill must have at least one item",
        ));
    }

    let mut fields = FieldErrors::new();
    for (index, line) in items.iter().enumerate() {
        if line.quantity <= 0 {
            fields
                .entry(format!("items[{}].quantity", index))
                .or_default()
                .push("Quantity must be a positive integer".to_string());
        }
    }
    if !fields.is_empty() {
        return Err(ServiceError::FieldValidation(fields));
    }

    let mut merged: Vec<BillLine> = Vec::with_capacity(items.len());
    let mut positions: HashMap<Uuid, usize> = HashMap::new();
    for line in items {
        match positions.get(&line.product_id) {
            Some(&pos) => {
                let quantity = merged[pos].quantity.checked_add(line.quantity).ok_or_else(|| {
                    ServiceError::field(
                        "items",
                        "Combined quantity for a product is too large",
                    )
                })?;
                merged[pos].quantity = quantity;
            }
            None => {
                positions.insert(line.product_id, merged.len());
                merged.push(*line);
            }
        }
    }

    Ok(merged)
}

/// Bill creation and bill history
#[derive(Clone)]
pub struct BillingService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    low_stock_threshold: i32,
    history_limit: u64,
}

impl BillingService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        low_stock_threshold: i32,
        history_limit: u64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            low_stock_threshold,
            history_limit,
        }
    }

    /// Records a sale: validates stock, writes the bill and its lines and
    /// takes the sold units out of stock, all in one transaction.
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn create_bill(&self, request: NewBill) -> Result<BillWithItems, ServiceError> {
        let started = Instant::now();
        let lines = merge_lines(&request.items)?;

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin bill transaction");
            ServiceError::DatabaseError(e)
        })?;

        let outcome = write_bill(&txn, &lines, request.total_amount).await;

        let (created, priced) = match outcome {
            Ok(done) => done,
            Err(err) => {
                if let Err(e) = txn.rollback().await {
                    error!(error = %e, "Failed to roll back bill transaction");
                }
                counter!("ramp_billing.bills_rejected", 1);
                warn!(error = %err, "Bill creation aborted");
                return Err(err);
            }
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit bill transaction");
            ServiceError::DatabaseError(e)
        })?;

        counter!("ramp_billing.bills_created", 1);
        histogram!("ramp_billing.create_bill.duration", started.elapsed());

        self.event_sender.send_or_log(Event::BillCreated {
            bill_id: created.bill.id,
            total_amount: created.bill.total_amount,
            item_count: created.items.len(),
        });
        for line in &priced {
            let remaining = line.product.quantity - line.quantity;
            if remaining <= self.low_stock_threshold {
                self.event_sender.send_or_log(Event::StockLow {
                    product_id: line.product.id,
                    product_name: line.product.name.clone(),
                    quantity: remaining,
                });
            }
        }

        info!(
            bill_id = %created.bill.id,
            reference = %created.bill.reference(),
            total_amount = %created.bill.total_amount,
            "Bill created successfully"
        );

        Ok(created)
    }

    /// Latest bills first, never more than the configured history limit.
    #[instrument(skip(self))]
    pub async fn list_bills(&self, limit: Option<u64>) -> Result<Vec<bill::Model>, ServiceError> {
        let db = &*self.db_pool;
        let limit = limit
            .filter(|l| *l > 0)
            .map(|l| l.min(self.history_limit))
            .unwrap_or(self.history_limit);

        Bill::find()
            .order_by_desc(bill::Column::CreatedAt)
            .order_by_desc(bill::Column::Id)
            .limit(limit)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list bills");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn get_bill(&self, id: Uuid) -> Result<BillWithItems, ServiceError> {
        let db = &*self.db_pool;

        let bill = Bill::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound("Bill not found".to_string()))?;

        let items = BillItem::find()
            .filter(bill_item::Column::BillId.eq(id))
            .order_by_asc(bill_item::Column::Sno)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(BillWithItems { bill, items })
    }
}

async fn write_bill(
    txn: &DatabaseTransaction,
    lines: &[BillLine],
    expected_total: Option<Decimal>,
) -> Result<(BillWithItems, Vec<PricedLine>), ServiceError> {
    let priced = price_lines(txn, lines).await?;

    let total_amount = bill_total(&priced)?;
    if let Some(expected) = expected_total {
        if expected != total_amount {
            return Err(ServiceError::field(
                "total_amount",
                format!(
                    "Total amount {} does not match the computed total {}",
                    expected, total_amount
                ),
            ));
        }
    }

    let created = record_bill(txn, &priced, total_amount).await?;
    Ok((created, priced))
}

/// Loads every product and checks the requested units are on hand.
async fn price_lines(
    txn: &DatabaseTransaction,
    lines: &[BillLine],
) -> Result<Vec<PricedLine>, ServiceError> {
    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let product = Product::find_by_id(line.product_id)
            .one(txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| insufficient_stock(&line.product_id.to_string(), 0))?;

        if product.quantity < line.quantity {
            return Err(insufficient_stock(&product.name, product.quantity));
        }
        let total = line_total(&product.name, product.price, line.quantity)?;
        priced.push(PricedLine {
            product,
            quantity: line.quantity,
            total,
        });
    }
    Ok(priced)
}

/// Writes the bill and its lines, then takes the units out of stock.
async fn record_bill(
    txn: &DatabaseTransaction,
    priced: &[PricedLine],
    total_amount: Decimal,
) -> Result<BillWithItems, ServiceError> {
    let now = Utc::now();
    let bill = bill::ActiveModel {
        id: Set(Uuid::new_v4()),
        total_amount: Set(total_amount),
        created_at: Set(now),
    }
    .insert(txn)
    .await
    .map_err(ServiceError::DatabaseError)?;

    let mut items = Vec::with_capacity(priced.len());
    for (index, line) in priced.iter().enumerate() {
        let item = bill_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            bill_id: Set(bill.id),
            sno: Set(index as i32 + 1),
            product_id: Set(Some(line.product.id)),
            product_name: Set(line.product.name.clone()),
            quantity: Set(line.quantity),
            price: Set(line.product.price),
            total: Set(line.total),
        }
        .insert(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;
        items.push(item);
    }

    for line in priced {
        // Guarded so a concurrent sale can never push stock below zero
        let result = Product::update_many()
            .col_expr(
                product::Column::Quantity,
                Expr::col(product::Column::Quantity).sub(line.quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::Id.eq(line.product.id))
            .filter(product::Column::Quantity.gte(line.quantity))
            .exec(txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            let available = Product::find_by_id(line.product.id)
                .one(txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .map(|p| p.quantity)
                .unwrap_or(0);
            return Err(insufficient_stock(&line.product.name, available));
        }
    }

    Ok(BillWithItems { bill, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DbConfig};
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use rust_decimal_macros::dec;

    fn line(product_id: Uuid, quantity: i32) -> BillLine {
        BillLine {
            product_id,
            quantity,
        }
    }

    #[test]
    fn empty_bill_is_rejected() {
        let err = merge_lines(&[]).unwrap_err();
        assert_matches!(&err, ServiceError::FieldValidation(fields) => {
            assert_eq!(fields["items"], vec!["Bill must have at least one item".to_string()]);
        });
    }

    #[test]
    fn non_positive_quantities_are_reported_per_line() {
        let a = Uuid::new_v4();
        let err = merge_lines(&[line(a, 1), line(a, 0), line(a, -2)]).unwrap_err();
        assert_matches!(&err, ServiceError::FieldValidation(fields) => {
            assert!(fields.contains_key("items[1].quantity"));
            assert!(fields.contains_key("items[2].quantity"));
            assert!(!fields.contains_key("items[0].quantity"));
        });
    }

    #[test]
    fn duplicate_products_merge_in_first_seen_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(&[line(a, 2), line(b, 1), line(a, 3)]).unwrap();
        assert_eq!(merged, vec![line(a, 5), line(b, 1)]);
    }

    #[test]
    fn merged_quantity_overflow_is_a_validation_error() {
        let a = Uuid::new_v4();
        let err = merge_lines(&[line(a, i32::MAX), line(a, 1)]).unwrap_err();
        assert_matches!(err, ServiceError::FieldValidation(_));
    }

    #[test]
    fn insufficient_stock_message_names_product() {
        let err = insufficient_stock("Blue Pen", 3);
        assert_matches!(err, ServiceError::InsufficientStock(msg) => {
            assert_eq!(msg, "Insufficient stock for Blue Pen. Available: 3");
        });
    }

    #[test]
    fn line_total_overflow_is_a_field_error() {
        let err = line_total("Gold", Decimal::MAX, 2).unwrap_err();
        assert_matches!(&err, ServiceError::FieldValidation(fields) => {
            assert!(fields.contains_key("items"));
        });

        let err = line_total("Gold", dec!(999999999999999), 2).unwrap_err();
        assert_matches!(err, ServiceError::FieldValidation(_));

        assert_eq!(line_total("Pen", dec!(1.25), 4).unwrap(), dec!(5.00));
    }

    async fn memory_db() -> DbPool {
        let pool = db::establish_connection_with_config(&DbConfig::sqlite_memory())
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    async fn stocked_product(
        pool: &DbPool,
        name: &str,
        price: Decimal,
        quantity: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            quantity: Set(quantity),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn bill_total_overflow_is_a_field_error() {
        let pool = memory_db().await;
        let a = stocked_product(&pool, "Gold", dec!(600000000000000), 1).await;
        let b = stocked_product(&pool, "Platinum", dec!(600000000000000), 1).await;

        let txn = pool.begin().await.unwrap();
        let priced = price_lines(&txn, &[line(a.id, 1), line(b.id, 1)])
            .await
            .unwrap();
        txn.rollback().await.unwrap();

        let err = bill_total(&priced).unwrap_err();
        assert_matches!(&err, ServiceError::FieldValidation(fields) => {
            assert!(fields.contains_key("total_amount"));
        });
    }

    #[tokio::test]
    async fn guarded_decrement_rejects_stale_stock_read() {
        let pool = memory_db().await;
        let pen = stocked_product(&pool, "Blue Pen", dec!(1.25), 5).await;

        // Five on hand when the sale of four is priced
        let txn = pool.begin().await.unwrap();
        let priced = price_lines(&txn, &[line(pen.id, 4)]).await.unwrap();
        txn.commit().await.unwrap();

        // A competing sale leaves two before this one is written
        Product::update_many()
            .col_expr(product::Column::Quantity, Expr::value(2))
            .filter(product::Column::Id.eq(pen.id))
            .exec(&pool)
            .await
            .unwrap();

        let txn = pool.begin().await.unwrap();
        let total = bill_total(&priced).unwrap();
        let err = record_bill(&txn, &priced, total).await.unwrap_err();
        txn.rollback().await.unwrap();

        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_matches!(err, ServiceError::InsufficientStock(msg) => {
            assert_eq!(msg, "Insufficient stock for Blue Pen. Available: 2");
        });

        let stored = Product::find_by_id(pen.id).one(&pool).await.unwrap().unwrap();
        assert_eq!(stored.quantity, 2);
        assert!(Bill::find().all(&pool).await.unwrap().is_empty());
        assert!(BillItem::find().all(&pool).await.unwrap().is_empty());
    }
}
