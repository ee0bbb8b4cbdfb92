use std::sync::Arc;

use crate::{
    db::DbPool,
    entities::{
        product::{self, Column as ProductColumn, Entity as Product},
        MAX_AMOUNT,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

const MAX_NAME_LEN: usize = 255;

/// Badge shown next to a product in the stock book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Missing,
    LowStock,
    Available,
}

impl StockStatus {
    pub fn classify(quantity: i32, low_stock_threshold: i32) -> Self {
        if quantity <= 0 {
            StockStatus::Missing
        } else if quantity <= low_stock_threshold {
            StockStatus::LowStock
        } else {
            StockStatus::Available
        }
    }
}

/// Fields accepted when creating or replacing a product
#[derive(Debug, Clone, Validate)]
pub struct ProductInput {
    #[validate(custom = "validate_name")]
    pub name: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Quantity must be non-negative"))]
    pub quantity: i32,
}

impl ProductInput {
    pub fn new(name: impl Into<String>, price: Decimal, quantity: i32) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }

    pub(crate) fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            ..self
        }
    }
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("Name is required".into());
        return Err(err);
    }
    if name.chars().count() > MAX_NAME_LEN {
        let mut err = ValidationError::new("length");
        err.message = Some("Name must be at most 255 characters".into());
        return Err(err);
    }
    Ok(())
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("Price must be non-negative".into());
        return Err(err);
    }
    if *price > MAX_AMOUNT {
        let mut err = ValidationError::new("range");
        err.message = Some(format!("Price must be at most {}", MAX_AMOUNT).into());
        return Err(err);
    }
    Ok(())
}

fn duplicate_name(name: &str) -> ServiceError {
    ServiceError::Conflict(format!("A product named '{}' already exists", name))
}

fn product_not_found() -> ServiceError {
    ServiceError::NotFound("Product not found".to_string())
}

/// Product CRUD and stock queries
#[derive(Clone)]
pub struct StockService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    low_stock_threshold: i32,
}

impl StockService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        low_stock_threshold: i32,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            low_stock_threshold,
        }
    }

    pub fn low_stock_threshold(&self) -> i32 {
        self.low_stock_threshold
    }

    pub fn status_of(&self, product: &product::Model) -> StockStatus {
        StockStatus::classify(product.quantity, self.low_stock_threshold)
    }

    /// All products, newest first. `search` keeps names containing it verbatim.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let db = &*self.db_pool;
        let needle = search.map(str::trim).filter(|s| !s.is_empty());

        let mut query = Product::find();
        if let Some(needle) = needle {
            query = query.filter(ProductColumn::Name.contains(needle));
        }

        let mut products = query
            .order_by_desc(ProductColumn::CreatedAt)
            .order_by_asc(ProductColumn::Name)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list products");
                ServiceError::DatabaseError(e)
            })?;

        // LIKE folds case on some backends
        if let Some(needle) = needle {
            products.retain(|p| p.name.contains(needle));
        }

        Ok(products)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        let db = &*self.db_pool;

        Product::find_by_id(id)
            .one(db)
            .await
            .map_err(|e| {
                error!(product_id = %id, error = %e, "Database error when fetching product");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(product_not_found)
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: ProductInput,
    ) -> Result<product::Model, ServiceError> {
        let input = input.normalized();
        input.validate()?;

        let db = &*self.db_pool;

        let existing = Product::find()
            .filter(ProductColumn::Name.eq(input.name.as_str()))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if existing.is_some() {
            return Err(duplicate_name(&input.name));
        }

        let now = chrono::Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.clone()),
            price: Set(input.price),
            quantity: Set(input.quantity),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let result = product.insert(db).await.map_err(|e| {
            error!(name = %input.name, error = %e, "Failed to create product");
            ServiceError::db_error(e, format!("A product named '{}' already exists", input.name))
        })?;

        self.event_sender
            .send_or_log(Event::ProductCreated(result.id));

        info!(product_id = %result.id, name = %result.name, "Product created successfully");

        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: ProductInput,
    ) -> Result<product::Model, ServiceError> {
        let input = input.normalized();
        input.validate()?;

        let db = &*self.db_pool;

        let current = self.get_product(id).await?;

        let clash = Product::find()
            .filter(ProductColumn::Name.eq(input.name.as_str()))
            .filter(ProductColumn::Id.ne(id))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if clash.is_some() {
            return Err(duplicate_name(&input.name));
        }

        let mut active = current.into_active_model();
        active.name = Set(input.name.clone());
        active.price = Set(input.price);
        active.quantity = Set(input.quantity);

        let updated = active.update(db).await.map_err(|e| {
            error!(product_id = %id, error = %e, "Failed to update product");
            ServiceError::db_error(e, format!("A product named '{}' already exists", input.name))
        })?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id));

        info!(product_id = %updated.id, "Product updated successfully");

        Ok(updated)
    }

    /// Removes a product. Bill lines that sold it keep their snapshots.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let product = self.get_product(id).await?;
        product.delete(db).await.map_err(|e| {
            error!(product_id = %id, error = %e, "Failed to delete product");
            ServiceError::DatabaseError(e)
        })?;

        self.event_sender.send_or_log(Event::ProductDeleted(id));

        info!(product_id = %id, "Product deleted successfully");

        Ok(())
    }

    /// Products at or below `threshold` units, scarcest first.
    #[instrument(skip(self))]
    pub async fn low_stock_products(
        &self,
        threshold: Option<i32>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let db = &*self.db_pool;
        let threshold = threshold.unwrap_or(self.low_stock_threshold);

        Product::find()
            .filter(ProductColumn::Quantity.lte(threshold))
            .order_by_asc(ProductColumn::Quantity)
            .order_by_asc(ProductColumn::Name)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(0, StockStatus::Missing)]
    #[case(1, StockStatus::LowStock)]
    #[case(5, StockStatus::LowStock)]
    #[case(6, StockStatus::Available)]
    #[case(120, StockStatus::Available)]
    fn classifies_stock_against_threshold(#[case] quantity: i32, #[case] expected: StockStatus) {
        assert_eq!(StockStatus::classify(quantity, 5), expected);
    }

    #[test]
    fn blank_name_is_required_after_trimming() {
        let input = ProductInput::new("   ", dec!(1.00), 1).normalized();
        let err: ServiceError = input.validate().unwrap_err().into();
        let fields = err.fields().unwrap();
        assert_eq!(fields["name"], vec!["Name is required".to_string()]);
    }

    #[test]
    fn negative_price_and_quantity_report_each_field() {
        let input = ProductInput::new("Pen", dec!(-1), -3);
        let err: ServiceError = input.validate().unwrap_err().into();
        let fields = err.fields().unwrap();
        assert_eq!(fields["price"], vec!["Price must be non-negative".to_string()]);
        assert_eq!(
            fields["quantity"],
            vec!["Quantity must be non-negative".to_string()]
        );
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn price_is_bounded_by_money_column() {
        assert!(ProductInput::new("Gold", MAX_AMOUNT, 1).validate().is_ok());

        let input = ProductInput::new("Gold", dec!(100000000000000000000), 1);
        let err: ServiceError = input.validate().unwrap_err().into();
        let fields = err.fields().unwrap();
        assert_eq!(
            fields["price"],
            vec!["Price must be at most 999999999999999.9999".to_string()]
        );
    }

    #[test]
    fn overly_long_name_is_rejected() {
        let input = ProductInput::new("x".repeat(256), dec!(1), 1);
        assert!(input.validate().is_err());
    }
}
