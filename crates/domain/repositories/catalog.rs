use anyhow::Result;
use uuid::Uuid;

use crate::domain::entities::{plans::PlanEntity, prices::PriceEntity, products::ProductEntity};

pub trait CatalogRepository {
    fn find_price(&mut self, price_id: Uuid) -> Result<Option<PriceEntity>>;

    fn find_plan(&mut self, plan_id: Uuid) -> Result<Option<PlanEntity>>;

    fn find_product(&mut self, product_id: Uuid) -> Result<Option<ProductEntity>>;
}
