use anyhow::Result;
use diesel::{PgConnection, prelude::*};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            plans::{PlanEntity, PlanRow},
            prices::{PriceEntity, PriceRow},
            products::ProductEntity,
        },
        repositories::catalog::CatalogRepository,
    },
    infra::db::postgres::schema::{plans, prices, products},
};

impl CatalogRepository for PgConnection {
    fn find_price(&mut self, price_id: Uuid) -> Result<Option<PriceEntity>> {
        let row = prices::table
            .find(price_id)
            .select(PriceRow::as_select())
            .first::<PriceRow>(self)
            .optional()?;

        Ok(row.map(PriceEntity::from))
    }

    fn find_plan(&mut self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        let row = plans::table
            .find(plan_id)
            .select(PlanRow::as_select())
            .first::<PlanRow>(self)
            .optional()?;

        row.map(PlanEntity::try_from).transpose()
    }

    fn find_product(&mut self, product_id: Uuid) -> Result<Option<ProductEntity>> {
        let product = products::table
            .find(product_id)
            .select(ProductEntity::as_select())
            .first::<ProductEntity>(self)
            .optional()?;

        Ok(product)
    }
}
