use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::{
        payment_providers::PaymentProvider, payment_statuses::PaymentStatus,
    },
    infra::db::postgres::schema::payments,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_ref: String,
    pub provider_transaction_id: Option<String>,
    pub checkout_session_id: Uuid,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.status)
    }

    pub fn provider(&self) -> Option<PaymentProvider> {
        PaymentProvider::from_str(&self.provider)
    }

    pub fn is_paid(&self) -> bool {
        self.status() == Some(PaymentStatus::Paid)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_ref: String,
    pub provider_transaction_id: Option<String>,
    pub checkout_session_id: Uuid,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Fields the recorder rewrites on an existing payment row.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = payments)]
pub struct PaymentOutcomeChangeset {
    pub status: String,
    pub provider_transaction_id: Option<String>,
    pub amount: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
