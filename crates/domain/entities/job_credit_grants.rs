use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::job_credit_grants;

/// Append-only ledger row; the unique `payment_id` is the idempotency anchor for top-ups.
#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = job_credit_grants)]
pub struct JobCreditGrantEntity {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = job_credit_grants)]
pub struct InsertJobCreditGrantEntity {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub credits: i32,
}
