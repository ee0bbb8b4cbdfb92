use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A catalog entry in the stock book
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product name, unique across the catalog
    #[sea_orm(unique)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Unit selling price
    #[validate(custom = "validate_non_negative_price")]
    pub price: Decimal,

    /// Units on hand
    #[validate(range(min = 0, message = "Quantity must be non-negative"))]
    pub quantity: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

fn validate_non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("price");
        err.message = Some("Price must be non-negative".into());
        return Err(err);
    }
    if *price > super::MAX_AMOUNT {
        let mut err = ValidationError::new("price");
        err.message = Some(format!("Price must be at most {}", super::MAX_AMOUNT).into());
        return Err(err);
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bill_item::Entity")]
    BillItems,
}

impl Related<super::bill_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BillItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn model(price: Decimal, quantity: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Notebook".into(),
            price,
            quantity,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn zero_price_and_quantity_are_valid() {
        assert!(model(dec!(0), 0).validate().is_ok());
    }

    #[test]
    fn negative_values_are_rejected() {
        let errors = model(dec!(-0.01), -1).validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("price"));
        assert!(fields.contains_key("quantity"));
    }

    #[test]
    fn price_beyond_column_precision_is_rejected() {
        assert!(model(crate::entities::MAX_AMOUNT, 1).validate().is_ok());
        let errors = model(dec!(1000000000000000), 1).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));
    }
}
