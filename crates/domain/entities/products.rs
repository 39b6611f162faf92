use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::purchase_types::ProductType,
    infra::db::postgres::schema::products,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = products)]
pub struct ProductEntity {
    pub id: Uuid,
    pub name: String,
    pub product_type: String,
    pub is_active: bool,
}

impl ProductEntity {
    pub fn product_type(&self) -> Option<ProductType> {
        ProductType::from_str(&self.product_type)
    }
}
