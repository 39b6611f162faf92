use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::payment_webhook_logs::{
            InsertPaymentWebhookLogEntity, PaymentWebhookLogEntity,
        },
        repositories::webhook_logs::WebhookLogRepository,
        value_objects::enums::webhook_log_statuses::WebhookLogStatus,
    },
    infra::db::postgres::schema::payment_webhook_logs,
};

impl WebhookLogRepository for PgConnection {
    fn insert_webhook_log(
        &mut self,
        log: InsertPaymentWebhookLogEntity,
    ) -> Result<Option<PaymentWebhookLogEntity>> {
        let inserted = insert_into(payment_webhook_logs::table)
            .values(&log)
            .on_conflict((
                payment_webhook_logs::provider,
                payment_webhook_logs::external_id,
            ))
            .do_nothing()
            .returning(PaymentWebhookLogEntity::as_returning())
            .get_result::<PaymentWebhookLogEntity>(self)
            .optional()?;

        Ok(inserted)
    }

    fn find_webhook_log(
        &mut self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<PaymentWebhookLogEntity>> {
        let log = payment_webhook_logs::table
            .filter(payment_webhook_logs::provider.eq(provider))
            .filter(payment_webhook_logs::external_id.eq(external_id))
            .select(PaymentWebhookLogEntity::as_select())
            .first::<PaymentWebhookLogEntity>(self)
            .optional()?;

        Ok(log)
    }

    fn reclaim_webhook_log(
        &mut self,
        log_id: Uuid,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = update(payment_webhook_logs::table.find(log_id))
            .filter(
                payment_webhook_logs::status
                    .eq(WebhookLogStatus::Failed.as_str())
                    .or(payment_webhook_logs::status
                        .eq(WebhookLogStatus::Received.as_str())
                        .and(payment_webhook_logs::received_at.lt(stale_before))),
            )
            .set((
                payment_webhook_logs::status.eq(WebhookLogStatus::Received.as_str()),
                payment_webhook_logs::received_at.eq(now),
                payment_webhook_logs::error.eq(None::<String>),
                payment_webhook_logs::processed_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(self)?;

        Ok(rows == 1)
    }

    fn finish_webhook_log(
        &mut self,
        log_id: Uuid,
        status: WebhookLogStatus,
        error: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        update(payment_webhook_logs::table.find(log_id))
            .set((
                payment_webhook_logs::status.eq(status.as_str()),
                payment_webhook_logs::error.eq(error),
                payment_webhook_logs::processed_at.eq(Some(processed_at)),
            ))
            .execute(self)?;

        Ok(())
    }
}
