use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recorded sale. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Short human-facing bill number: last six characters of the id, upper-cased.
    pub fn reference(&self) -> String {
        reference_for(&self.id)
    }
}

pub fn reference_for(id: &Uuid) -> String {
    let simple = id.simple().to_string();
    simple[simple.len() - 6..].to_uppercase()
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bill_item::Entity")]
    Items,
}

impl Related<super::bill_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}
