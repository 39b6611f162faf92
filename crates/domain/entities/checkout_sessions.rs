use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::{
        payment_providers::PaymentProvider, purchase_types::PurchaseType,
    },
    infra::db::postgres::schema::checkout_sessions,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = checkout_sessions)]
pub struct CheckoutSessionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub price_id: Option<Uuid>,
    pub purchase_type: String,
    pub enrollment_id: Option<Uuid>,
    pub installment_index: Option<i32>,
    pub amount: i64,
    pub currency: String,
    pub idempotency_key: String,
    pub redirect_url: Option<String>,
    pub return_url: String,
    pub created_at: DateTime<Utc>,
}

impl CheckoutSessionEntity {
    pub fn provider(&self) -> Option<PaymentProvider> {
        PaymentProvider::from_str(&self.provider)
    }

    pub fn purchase_type(&self) -> Option<PurchaseType> {
        PurchaseType::from_str(&self.purchase_type)
    }

    /// Payments are keyed by the session, never by the provider's transaction id, so a
    /// retried authority for the same purchase attempt lands on the same payment row.
    pub fn provider_ref(&self) -> String {
        self.id.to_string()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = checkout_sessions)]
pub struct InsertCheckoutSessionEntity {
    pub user_id: Uuid,
    pub provider: String,
    pub price_id: Option<Uuid>,
    pub purchase_type: String,
    pub enrollment_id: Option<Uuid>,
    pub installment_index: Option<i32>,
    pub amount: i64,
    pub currency: String,
    pub idempotency_key: String,
    pub return_url: String,
}
