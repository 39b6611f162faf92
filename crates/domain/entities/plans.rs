use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{enums::plan_cycles::PlanCycle, plans::PlanLimits},
    infra::db::postgres::schema::plans,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntity {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub cycle: PlanCycle,
    pub limits: PlanLimits,
    pub is_active: bool,
}

/// Raw row used for Diesel queries. Limits stay as JSON and the cycle as text until parsed.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = plans)]
pub struct PlanRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub cycle: String,
    pub limits: serde_json::Value,
    pub is_active: bool,
}

impl TryFrom<PlanRow> for PlanEntity {
    type Error = anyhow::Error;

    fn try_from(value: PlanRow) -> Result<Self, Self::Error> {
        let cycle = PlanCycle::from_str(&value.cycle)
            .ok_or_else(|| anyhow::anyhow!("plan {} has unknown cycle {}", value.id, value.cycle))?;
        let limits = serde_json::from_value(value.limits).unwrap_or_default();

        Ok(Self {
            id: value.id,
            product_id: value.product_id,
            name: value.name,
            cycle,
            limits,
            is_active: value.is_active,
        })
    }
}
