use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::webhook_log_statuses::WebhookLogStatus,
    infra::db::postgres::schema::payment_webhook_logs,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payment_webhook_logs)]
pub struct PaymentWebhookLogEntity {
    pub id: Uuid,
    pub provider: String,
    pub external_id: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PaymentWebhookLogEntity {
    pub fn status(&self) -> Option<WebhookLogStatus> {
        WebhookLogStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payment_webhook_logs)]
pub struct InsertPaymentWebhookLogEntity {
    pub provider: String,
    pub external_id: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub error: Option<String>,
}
