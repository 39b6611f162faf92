use diesel::prelude::*;
use uuid::Uuid;

use crate::{domain::value_objects::plans::PriceMetadata, infra::db::postgres::schema::prices};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceEntity {
    pub id: Uuid,
    pub product_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub metadata: PriceMetadata,
    pub is_active: bool,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = prices)]
pub struct PriceRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub metadata: serde_json::Value,
    pub is_active: bool,
}

impl From<PriceRow> for PriceEntity {
    fn from(value: PriceRow) -> Self {
        let metadata = serde_json::from_value(value.metadata).unwrap_or_default();

        Self {
            id: value.id,
            product_id: value.product_id,
            plan_id: value.plan_id,
            amount: value.amount,
            currency: value.currency,
            metadata,
            is_active: value.is_active,
        }
    }
}
