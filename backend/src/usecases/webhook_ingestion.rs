use std::sync::Arc;
use billing_core::domain::repositories::{webhook_logs::WebhookLogRepository};

use anyhow::Context;
use axum::http::StatusCode;
use billing_core::{
    domain::{
        entities::payment_webhook_logs::InsertPaymentWebhookLogEntity,
        repositories::{BillingTx, TransactionManager},
        value_objects::{
            enums::{payment_providers::PaymentProvider, webhook_log_statuses::WebhookLogStatus},
            webhooks::{VerifiedWebhook, WebhookReceipt},
        },
    },
    payments::{
        adapter::{PaymentProviderAdapter, WebhookVerifyError},
        registry::ProviderRegistry,
    },
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::{
    billing_dispatch::{DispatchError, dispatch_payment_outcome},
    payment_recorder::{PaymentRecordError, record_payment_outcome},
};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("unknown payment provider {0}")]
    UnknownProvider(String),
    #[error(transparent)]
    Verify(#[from] WebhookVerifyError),
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::UnknownProvider(_) => StatusCode::NOT_FOUND,
            WebhookError::Verify(_) => StatusCode::BAD_REQUEST,
            WebhookError::Rejected { status, .. } => *status,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            WebhookError::Verify(WebhookVerifyError::MissingSignature) => "MISSING_SIGNATURE",
            WebhookError::Verify(WebhookVerifyError::InvalidSignature) => "INVALID_SIGNATURE",
            WebhookError::Verify(WebhookVerifyError::MalformedPayload(_)) => "MALFORMED_PAYLOAD",
            WebhookError::Rejected { code, .. } => *code,
            WebhookError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<PaymentRecordError> for WebhookError {
    fn from(value: PaymentRecordError) -> Self {
        match value {
            PaymentRecordError::Internal(err) => WebhookError::Internal(err),
            other => WebhookError::Rejected {
                status: other.status_code(),
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

impl From<DispatchError> for WebhookError {
    fn from(value: DispatchError) -> Self {
        if value.is_internal() {
            return WebhookError::Internal(anyhow::Error::new(value));
        }
        WebhookError::Rejected {
            status: value.status_code(),
            code: value.code(),
            message: value.to_string(),
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, WebhookError>;

enum LogClaim {
    Claimed(Uuid),
    Replay,
}

/// How long a `received` log may stay in flight before a redelivery may take it over.
pub const PROCESSING_TIMEOUT: Duration = Duration::minutes(5);

/// Inserts the `received` log row for this delivery. An existing row means a replay, unless
/// it is `failed`, or `received` for longer than [`PROCESSING_TIMEOUT`], and this caller
/// manages to reclaim it for another attempt.
fn claim_webhook_log<T: BillingTx>(
    tx: &mut T,
    provider: PaymentProvider,
    webhook: &VerifiedWebhook,
    now: DateTime<Utc>,
) -> anyhow::Result<LogClaim> {
    let inserted = tx.insert_webhook_log(InsertPaymentWebhookLogEntity {
        provider: provider.to_string(),
        external_id: webhook.external_id.clone(),
        payload: webhook.payload.clone(),
        status: WebhookLogStatus::Received.to_string(),
        error: None,
    })?;
    if let Some(log) = inserted {
        return Ok(LogClaim::Claimed(log.id));
    }

    let existing = tx
        .find_webhook_log(provider.as_str(), &webhook.external_id)?
        .context("webhook log vanished after insert conflict")?;
    let reclaimable = match existing.status() {
        Some(WebhookLogStatus::Failed) => true,
        Some(WebhookLogStatus::Received) => existing.received_at < now - PROCESSING_TIMEOUT,
        _ => false,
    };
    if reclaimable && tx.reclaim_webhook_log(existing.id, now - PROCESSING_TIMEOUT, now)? {
        info!(
            log_id = %existing.id,
            %provider,
            previous_status = %existing.status,
            "webhooks: reclaimed unfinished delivery"
        );
        return Ok(LogClaim::Claimed(existing.id));
    }

    Ok(LogClaim::Replay)
}

pub struct WebhookIngestionUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
    registry: ProviderRegistry,
}

impl<S> WebhookIngestionUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>, registry: ProviderRegistry) -> Self {
        Self { store, registry }
    }

    fn adapter(&self, provider_name: &str) -> UseCaseResult<Arc<dyn PaymentProviderAdapter>> {
        PaymentProvider::from_str(provider_name)
            .and_then(|provider| self.registry.get(provider))
            .ok_or_else(|| WebhookError::UnknownProvider(provider_name.to_string()))
    }

    /// Header the provider signs its deliveries in, if the provider is configured.
    pub fn signature_header(&self, provider_name: &str) -> Option<&'static str> {
        self.adapter(provider_name)
            .ok()
            .map(|adapter| adapter.signature_header())
    }

    /// Verifies, deduplicates and applies one provider delivery. Replays return
    /// `idempotent = true` without touching any payment state.
    pub fn ingest(
        &self,
        provider_name: &str,
        raw_body: &[u8],
        signature: Option<&str>,
        now: DateTime<Utc>,
    ) -> UseCaseResult<WebhookReceipt> {
        let adapter = self.adapter(provider_name).inspect_err(|_| {
            warn!(provider = provider_name, "webhooks: delivery for unknown provider");
        })?;
        let provider = adapter.provider();

        let verified = signature
            .ok_or(WebhookVerifyError::MissingSignature)
            .and_then(|signature| adapter.verify(raw_body, signature));
        let webhook = match verified {
            Ok(webhook) => webhook,
            Err(err) => {
                self.log_invalid(provider, raw_body, &err, now)?;
                return Err(err.into());
            }
        };

        let claim = self
            .store
            .with_transaction(|tx| claim_webhook_log(tx, provider, &webhook, now))
            .inspect_err(|err| {
                error!(%provider, db_error = ?err, "webhooks: failed to write delivery log");
            })?;
        let log_id = match claim {
            LogClaim::Claimed(log_id) => log_id,
            LogClaim::Replay => {
                info!(
                    %provider,
                    external_id = %webhook.external_id,
                    "webhooks: replayed delivery ignored"
                );
                return Ok(WebhookReceipt::replay());
            }
        };

        let processed = self.store.with_transaction(|tx| {
            let recorded = record_payment_outcome(tx, provider, &webhook, now)?;
            let effect = dispatch_payment_outcome(tx, &recorded, webhook.outcome, now)?;
            Ok::<_, WebhookError>(WebhookReceipt {
                idempotent: false,
                payment_id: Some(recorded.payment.id),
                effect: Some(effect),
            })
        });

        let (status, log_error) = match &processed {
            Ok(_) => (WebhookLogStatus::Processed, None),
            Err(WebhookError::Internal(err)) => {
                error!(%log_id, %provider, db_error = ?err, "webhooks: processing failed");
                (WebhookLogStatus::Failed, Some(format!("{err:#}")))
            }
            Err(err) => {
                warn!(%log_id, %provider, code = err.code(), error = %err, "webhooks: delivery rejected");
                (WebhookLogStatus::Rejected, Some(err.to_string()))
            }
        };
        self.store
            .with_transaction(|tx| tx.finish_webhook_log(log_id, status, log_error, now))
            .inspect_err(|err: &anyhow::Error| {
                error!(%log_id, db_error = ?err, "webhooks: failed to finish delivery log");
            })?;

        if let Ok(receipt) = &processed {
            info!(
                %log_id,
                %provider,
                payment_id = ?receipt.payment_id,
                effect = ?receipt.effect,
                "webhooks: delivery processed"
            );
        }

        processed
    }

    /// Keeps a durable record of a delivery that failed verification. The external id is
    /// synthetic so an attacker cannot occupy a real transaction's dedupe slot.
    fn log_invalid(
        &self,
        provider: PaymentProvider,
        raw_body: &[u8],
        err: &WebhookVerifyError,
        now: DateTime<Utc>,
    ) -> UseCaseResult<()> {
        warn!(%provider, error = %err, "webhooks: delivery failed verification");

        let log = InsertPaymentWebhookLogEntity {
            provider: provider.to_string(),
            external_id: format!("invalid:{}", Uuid::new_v4()),
            payload: json!({ "raw": String::from_utf8_lossy(raw_body) }),
            status: WebhookLogStatus::Invalid.to_string(),
            error: Some(err.to_string()),
        };
        self.store
            .with_transaction(|tx| {
                if let Some(inserted) = tx.insert_webhook_log(log)? {
                    tx.finish_webhook_log(inserted.id, WebhookLogStatus::Invalid, Some(err.to_string()), now)?;
                }
                Ok(())
            })
            .inspect_err(|err: &anyhow::Error| {
                error!(%provider, db_error = ?err, "webhooks: failed to log invalid delivery");
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::{
        domain::{
            entities::{
                checkout_sessions::InsertCheckoutSessionEntity,
                payment_webhook_logs::PaymentWebhookLogEntity,
            },
            repositories::checkout_sessions::CheckoutSessionRepository,
            value_objects::{
                billing::{DispatchEffect, SubscriptionApplyOutcome},
                enums::{
                    payment_statuses::PaymentStatus, plan_cycles::PlanCycle,
                    purchase_types::PurchaseType,
                },
                webhooks::PaymentOutcome,
            },
        },
        infra::memory::InMemoryBillingStore,
        payments::adapter::MockPaymentProviderAdapter,
    };
    use serde::Deserialize;

    const GOOD_SIGNATURE: &str = "good";

    #[derive(Deserialize)]
    struct FakeDelivery {
        session_id: Uuid,
        track_id: String,
        paid: bool,
        amount: i64,
    }

    /// Accepts `FakeDelivery` JSON signed with `GOOD_SIGNATURE`; the external id is the track id
    /// plus outcome, the way the real adapters key deliveries.
    fn fake_adapter(provider: PaymentProvider) -> MockPaymentProviderAdapter {
        let mut adapter = MockPaymentProviderAdapter::new();
        adapter.expect_provider().return_const(provider);
        adapter
            .expect_signature_header()
            .return_const("x-test-signature");
        adapter.expect_verify().returning(|raw_body, signature| {
            if signature != GOOD_SIGNATURE {
                return Err(WebhookVerifyError::InvalidSignature);
            }
            let delivery: FakeDelivery = serde_json::from_slice(raw_body)
                .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;
            let outcome = if delivery.paid {
                PaymentOutcome::Paid
            } else {
                PaymentOutcome::Failed
            };
            Ok(VerifiedWebhook {
                external_id: format!("{}:{}", delivery.track_id, delivery.paid),
                session_id: delivery.session_id,
                provider_transaction_id: delivery.track_id,
                outcome,
                amount: delivery.amount,
                payload: serde_json::from_slice(raw_body)
                    .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?,
            })
        });
        adapter
    }

    struct Fixture {
        store: Arc<InMemoryBillingStore>,
        usecase: WebhookIngestionUseCase<InMemoryBillingStore>,
        session_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        let session_id = store.seed(|state| {
            let price = state.seed_subscription_price(PlanCycle::Monthly, 450_000);
            state
                .insert_checkout_session(InsertCheckoutSessionEntity {
                    user_id: Uuid::new_v4(),
                    provider: PaymentProvider::Zarinpal.to_string(),
                    price_id: Some(price.price_id),
                    purchase_type: PurchaseType::Subscription.to_string(),
                    enrollment_id: None,
                    installment_index: None,
                    amount: 450_000,
                    currency: "IRR".to_string(),
                    idempotency_key: Uuid::new_v4().to_string(),
                    return_url: "https://app.test/return".to_string(),
                })
                .unwrap()
                .unwrap()
                .id
        });
        let registry = ProviderRegistry::new()
            .register(Arc::new(fake_adapter(PaymentProvider::Zarinpal)))
            .register(Arc::new(fake_adapter(PaymentProvider::IdPay)));
        let usecase = WebhookIngestionUseCase::new(Arc::clone(&store), registry);
        Fixture {
            store,
            usecase,
            session_id,
        }
    }

    fn body(session_id: Uuid, track_id: &str, paid: bool, amount: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "session_id": session_id,
            "track_id": track_id,
            "paid": paid,
            "amount": amount,
        }))
        .unwrap()
    }

    #[test]
    fn replayed_delivery_is_idempotent() {
        let fixture = fixture();
        let raw = body(fixture.session_id, "A1", true, 450_000);

        let first = fixture
            .usecase
            .ingest("zarinpal", &raw, Some(GOOD_SIGNATURE), Utc::now())
            .unwrap();
        assert!(!first.idempotent);
        assert!(matches!(
            first.effect,
            Some(DispatchEffect::Subscription {
                outcome: SubscriptionApplyOutcome::Applied { .. }
            })
        ));

        let second = fixture
            .usecase
            .ingest("zarinpal", &raw, Some(GOOD_SIGNATURE), Utc::now())
            .unwrap();
        assert_eq!(second, WebhookReceipt::replay());

        let state = fixture.store.snapshot();
        assert_eq!(state.payments.len(), 1);
        assert_eq!(state.invoices.len(), 1);
        assert_eq!(state.webhook_logs.len(), 1);
        assert_eq!(state.webhook_logs[0].status(), Some(WebhookLogStatus::Processed));
    }

    #[test]
    fn failed_then_paid_attempts_collapse_into_one_payment() {
        let fixture = fixture();

        let failed = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(fixture.session_id, "A1", false, 450_000),
                Some(GOOD_SIGNATURE),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(failed.effect, Some(DispatchEffect::None));

        let paid = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(fixture.session_id, "A2", true, 450_000),
                Some(GOOD_SIGNATURE),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(paid.payment_id, failed.payment_id);

        let state = fixture.store.snapshot();
        assert_eq!(state.payments.len(), 1);
        assert_eq!(state.payments[0].status(), Some(PaymentStatus::Paid));
        assert_eq!(state.invoices.len(), 1);
        assert_eq!(state.webhook_logs.len(), 2);
    }

    #[test]
    fn invalid_signature_is_logged_without_effects() {
        let fixture = fixture();
        let raw = body(fixture.session_id, "A1", true, 450_000);

        let err = fixture
            .usecase
            .ingest("zarinpal", &raw, Some("forged"), Utc::now())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_SIGNATURE");

        let missing = fixture
            .usecase
            .ingest("zarinpal", &raw, None, Utc::now())
            .unwrap_err();
        assert_eq!(missing.code(), "MISSING_SIGNATURE");

        let state = fixture.store.snapshot();
        assert!(state.payments.is_empty());
        assert_eq!(state.webhook_logs.len(), 2);
        assert!(state
            .webhook_logs
            .iter()
            .all(|log| log.status() == Some(WebhookLogStatus::Invalid)
                && log.external_id.starts_with("invalid:")));
    }

    #[test]
    fn mismatches_are_rejected_and_logged() {
        let fixture = fixture();

        let amount = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(fixture.session_id, "A1", true, 1),
                Some(GOOD_SIGNATURE),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(amount.status_code(), StatusCode::CONFLICT);
        assert_eq!(amount.code(), "AMOUNT_MISMATCH");

        let provider = fixture
            .usecase
            .ingest(
                "idpay",
                &body(fixture.session_id, "B1", true, 450_000),
                Some(GOOD_SIGNATURE),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(provider.code(), "PROVIDER_MISMATCH");

        let unknown_session = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(Uuid::new_v4(), "C1", true, 450_000),
                Some(GOOD_SIGNATURE),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(unknown_session.status_code(), StatusCode::NOT_FOUND);

        let state = fixture.store.snapshot();
        assert!(state.payments.is_empty());
        assert!(state
            .webhook_logs
            .iter()
            .all(|log| log.status() == Some(WebhookLogStatus::Rejected) && log.error.is_some()));
    }

    #[test]
    fn failed_log_is_reclaimed_and_processed() {
        let fixture = fixture();
        fixture.store.seed(|state| {
            state.webhook_logs.push(PaymentWebhookLogEntity {
                id: Uuid::new_v4(),
                provider: PaymentProvider::Zarinpal.to_string(),
                external_id: "A1:true".to_string(),
                payload: json!({}),
                status: WebhookLogStatus::Failed.to_string(),
                error: Some("connection reset".to_string()),
                received_at: Utc::now(),
                processed_at: Some(Utc::now()),
            })
        });

        let receipt = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(fixture.session_id, "A1", true, 450_000),
                Some(GOOD_SIGNATURE),
                Utc::now(),
            )
            .unwrap();

        assert!(!receipt.idempotent);
        let state = fixture.store.snapshot();
        assert_eq!(state.payments.len(), 1);
        assert_eq!(state.webhook_logs.len(), 1);
        assert_eq!(state.webhook_logs[0].status(), Some(WebhookLogStatus::Processed));
        assert_eq!(state.webhook_logs[0].error, None);
    }

    fn in_flight_log(received_at: DateTime<Utc>) -> PaymentWebhookLogEntity {
        PaymentWebhookLogEntity {
            id: Uuid::new_v4(),
            provider: PaymentProvider::Zarinpal.to_string(),
            external_id: "A1:true".to_string(),
            payload: json!({}),
            status: WebhookLogStatus::Received.to_string(),
            error: None,
            received_at,
            processed_at: None,
        }
    }

    #[test]
    fn log_stuck_in_received_is_taken_over_after_the_timeout() {
        let fixture = fixture();
        let now = Utc::now();
        fixture
            .store
            .seed(|state| state.webhook_logs.push(in_flight_log(now - PROCESSING_TIMEOUT - Duration::seconds(1))));

        let receipt = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(fixture.session_id, "A1", true, 450_000),
                Some(GOOD_SIGNATURE),
                now,
            )
            .unwrap();

        assert!(!receipt.idempotent);
        let state = fixture.store.snapshot();
        assert_eq!(state.payments.len(), 1);
        assert_eq!(state.webhook_logs.len(), 1);
        assert_eq!(state.webhook_logs[0].status(), Some(WebhookLogStatus::Processed));
        assert_eq!(state.webhook_logs[0].received_at, now);
    }

    #[test]
    fn log_still_in_flight_is_a_replay() {
        let fixture = fixture();
        let now = Utc::now();
        fixture
            .store
            .seed(|state| state.webhook_logs.push(in_flight_log(now - Duration::seconds(30))));

        let receipt = fixture
            .usecase
            .ingest(
                "zarinpal",
                &body(fixture.session_id, "A1", true, 450_000),
                Some(GOOD_SIGNATURE),
                now,
            )
            .unwrap();

        assert_eq!(receipt, WebhookReceipt::replay());
        let state = fixture.store.snapshot();
        assert!(state.payments.is_empty());
        assert_eq!(state.webhook_logs[0].status(), Some(WebhookLogStatus::Received));
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let fixture = fixture();

        let err = fixture
            .usecase
            .ingest("stripe", b"{}", Some(GOOD_SIGNATURE), Utc::now())
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(fixture.usecase.signature_header("payping"), None);
        assert_eq!(fixture.usecase.signature_header("zarinpal"), Some("x-test-signature"));
    }
}
