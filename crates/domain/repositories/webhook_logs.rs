use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::payment_webhook_logs::{InsertPaymentWebhookLogEntity, PaymentWebhookLogEntity},
    value_objects::enums::webhook_log_statuses::WebhookLogStatus,
};

pub trait WebhookLogRepository {
    /// Returns `None` when `(provider, external_id)` already exists.
    fn insert_webhook_log(
        &mut self,
        log: InsertPaymentWebhookLogEntity,
    ) -> Result<Option<PaymentWebhookLogEntity>>;

    fn find_webhook_log(
        &mut self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<PaymentWebhookLogEntity>>;

    /// Claims a log for another attempt: a `failed` row, or a `received` row whose
    /// `received_at` is before `stale_before` (its worker died mid-flight). The row goes back
    /// to `received` with `received_at = now`. Only one concurrent caller can win.
    fn reclaim_webhook_log(
        &mut self,
        log_id: Uuid,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    fn finish_webhook_log(
        &mut self,
        log_id: Uuid,
        status: WebhookLogStatus,
        error: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;
}
