use std::sync::Arc;

use anyhow::Context;
use billing_core::domain::{
    entities::{
        audit_logs::{InsertAuditLogEntity, payment_resource},
        checkout_sessions::CheckoutSessionEntity,
        invoices::{InsertInvoiceEntity, InvoiceEntity},
        payments::{InsertPaymentEntity, PaymentEntity, PaymentOutcomeChangeset},
    },
    repositories::{BillingTx, TransactionManager},
    value_objects::{
        enums::{
            audit_actions::AuditAction,
            invoice_statuses::{InvoiceStatus, InvoiceType},
            payment_providers::PaymentProvider,
            payment_statuses::PaymentStatus,
        },
        webhooks::{PaymentOutcome, VerifiedWebhook},
    },
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PaymentRecordError {
    #[error("checkout session {0} not found")]
    SessionNotFound(Uuid),
    #[error("session belongs to {expected}, webhook came from {actual}")]
    ProviderMismatch { expected: String, actual: PaymentProvider },
    #[error("paid amount {actual} does not match session amount {expected}")]
    AmountMismatch { expected: i64, actual: i64 },
    #[error("payment not found")]
    PaymentNotFound,
    #[error("invoice not found")]
    InvoiceNotFound,
    #[error("payment is {0} and cannot be refunded")]
    NotRefundable(String),
    #[error("invoice is {0} and cannot be voided")]
    NotVoidable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentRecordError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentRecordError::SessionNotFound(_)
            | PaymentRecordError::PaymentNotFound
            | PaymentRecordError::InvoiceNotFound => StatusCode::NOT_FOUND,
            PaymentRecordError::ProviderMismatch { .. }
            | PaymentRecordError::AmountMismatch { .. }
            | PaymentRecordError::NotRefundable(_)
            | PaymentRecordError::NotVoidable(_) => StatusCode::CONFLICT,
            PaymentRecordError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PaymentRecordError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            PaymentRecordError::ProviderMismatch { .. } => "PROVIDER_MISMATCH",
            PaymentRecordError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            PaymentRecordError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            PaymentRecordError::InvoiceNotFound => "INVOICE_NOT_FOUND",
            PaymentRecordError::NotRefundable(_) => "NOT_REFUNDABLE",
            PaymentRecordError::NotVoidable(_) => "NOT_VOIDABLE",
            PaymentRecordError::Internal(_) => "INTERNAL",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentRecordError>;

#[derive(Debug, Clone)]
pub struct RecordedPayment {
    pub payment: PaymentEntity,
    pub session: CheckoutSessionEntity,
    /// The payment reached `PAID` during this call.
    pub newly_paid: bool,
    pub invoice: Option<InvoiceEntity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<PaymentEntity> for PaymentDto {
    fn from(value: PaymentEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            provider: value.provider,
            status: value.status,
            amount: value.amount,
            currency: value.currency,
            paid_at: value.paid_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDto {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_type: String,
    pub status: String,
    pub total: i64,
    pub currency: String,
    pub issued_at: DateTime<Utc>,
}

impl From<InvoiceEntity> for InvoiceDto {
    fn from(value: InvoiceEntity) -> Self {
        Self {
            id: value.id,
            payment_id: value.payment_id,
            invoice_type: value.invoice_type,
            status: value.status,
            total: value.total,
            currency: value.currency,
            issued_at: value.issued_at,
        }
    }
}

/// Upserts the payment for the webhook's checkout session and moves it along the allowed
/// status transitions. Outcomes that would move a payment backwards are ignored. A paid
/// payment gets exactly one invoice.
pub fn record_payment_outcome<T: BillingTx>(
    tx: &mut T,
    provider: PaymentProvider,
    webhook: &VerifiedWebhook,
    now: DateTime<Utc>,
) -> UseCaseResult<RecordedPayment> {
    let session = tx
        .find_checkout_session(webhook.session_id)?
        .ok_or(PaymentRecordError::SessionNotFound(webhook.session_id))?;

    if session.provider() != Some(provider) {
        return Err(PaymentRecordError::ProviderMismatch {
            expected: session.provider.clone(),
            actual: provider,
        });
    }
    if webhook.outcome == PaymentOutcome::Paid && webhook.amount != session.amount {
        return Err(PaymentRecordError::AmountMismatch {
            expected: session.amount,
            actual: webhook.amount,
        });
    }

    let next = match webhook.outcome {
        PaymentOutcome::Paid => PaymentStatus::Paid,
        PaymentOutcome::Failed => PaymentStatus::Failed,
    };
    let paid_at = (next == PaymentStatus::Paid).then_some(now);
    let provider_ref = session.provider_ref();

    let mut payment = match tx.lock_payment_by_provider_ref(provider.as_str(), &provider_ref)? {
        Some(existing) => existing,
        None => {
            let inserted = tx.insert_payment(InsertPaymentEntity {
                user_id: session.user_id,
                provider: provider.to_string(),
                provider_ref: provider_ref.clone(),
                provider_transaction_id: Some(webhook.provider_transaction_id.clone()),
                checkout_session_id: session.id,
                status: next.to_string(),
                amount: session.amount,
                currency: session.currency.clone(),
                paid_at,
            })?;
            match inserted {
                Some(payment) => {
                    let newly_paid = payment.is_paid();
                    return finish_recording(tx, payment, session, newly_paid, now);
                }
                None => tx
                    .lock_payment_by_provider_ref(provider.as_str(), &provider_ref)?
                    .context("payment vanished after insert conflict")?,
            }
        }
    };

    let current = payment.status().unwrap_or(PaymentStatus::Pending);
    let mut newly_paid = false;

    if current == next && next == PaymentStatus::Paid {
        info!(payment_id = %payment.id, "payments: paid outcome already recorded");
    } else if current.can_transition_to(next) {
        payment = tx.update_payment_outcome(
            payment.id,
            PaymentOutcomeChangeset {
                status: next.to_string(),
                provider_transaction_id: Some(webhook.provider_transaction_id.clone()),
                amount: session.amount,
                paid_at,
                updated_at: now,
            },
        )?;
        newly_paid = next == PaymentStatus::Paid;
    } else {
        warn!(
            payment_id = %payment.id,
            from = %current,
            to = %next,
            "payments: ignoring outcome that would move payment backwards"
        );
    }

    finish_recording(tx, payment, session, newly_paid, now)
}

fn finish_recording<T: BillingTx>(
    tx: &mut T,
    payment: PaymentEntity,
    session: CheckoutSessionEntity,
    newly_paid: bool,
    now: DateTime<Utc>,
) -> UseCaseResult<RecordedPayment> {
    let invoice = if payment.is_paid() {
        ensure_invoice(tx, &payment, now)?
    } else {
        None
    };

    Ok(RecordedPayment {
        payment,
        session,
        newly_paid,
        invoice,
    })
}

fn ensure_invoice<T: BillingTx>(
    tx: &mut T,
    payment: &PaymentEntity,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<InvoiceEntity>> {
    let inserted = tx.insert_invoice(InsertInvoiceEntity {
        payment_id: payment.id,
        user_id: payment.user_id,
        invoice_type: InvoiceType::Sale.to_string(),
        status: InvoiceStatus::Paid.to_string(),
        total: payment.amount,
        currency: payment.currency.clone(),
        issued_at: now,
    })?;

    match inserted {
        Some(invoice) => Ok(Some(invoice)),
        None => tx.find_invoice_by_payment(payment.id),
    }
}

/// `PAID -> REFUNDED`, with the sale invoice following along.
pub fn refund_payment<T: BillingTx>(
    tx: &mut T,
    payment_id: Uuid,
    actor: &str,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> UseCaseResult<PaymentEntity> {
    let payment = tx
        .lock_payment(payment_id)?
        .ok_or(PaymentRecordError::PaymentNotFound)?;

    let current = payment.status().unwrap_or(PaymentStatus::Pending);
    if !current.can_transition_to(PaymentStatus::Refunded) {
        return Err(PaymentRecordError::NotRefundable(payment.status.clone()));
    }

    let refunded = tx.update_payment_outcome(
        payment.id,
        PaymentOutcomeChangeset {
            status: PaymentStatus::Refunded.to_string(),
            provider_transaction_id: None,
            amount: payment.amount,
            paid_at: None,
            updated_at: now,
        },
    )?;

    if let Some(invoice) = tx.find_invoice_by_payment(payment.id)? {
        tx.update_invoice_status(invoice.id, InvoiceStatus::Refunded, now)?;
    }

    let mut audit =
        InsertAuditLogEntity::new(actor, AuditAction::PaymentRefunded, payment_resource(payment.id))
            .with_before(json!({ "status": payment.status }))
            .with_after(json!({ "status": refunded.status }));
    if let Some(reason) = reason {
        audit = audit.with_reason(reason);
    }
    tx.append_audit_log(audit)?;

    Ok(refunded)
}

/// Only a `DRAFT` invoice can be voided.
pub fn void_invoice<T: BillingTx>(
    tx: &mut T,
    invoice_id: Uuid,
    actor: &str,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> UseCaseResult<InvoiceEntity> {
    let invoice = tx
        .lock_invoice(invoice_id)?
        .ok_or(PaymentRecordError::InvoiceNotFound)?;

    if invoice.status() != Some(InvoiceStatus::Draft) {
        return Err(PaymentRecordError::NotVoidable(invoice.status.clone()));
    }

    let voided = tx.update_invoice_status(invoice.id, InvoiceStatus::Void, now)?;

    let mut audit = InsertAuditLogEntity::new(
        actor,
        AuditAction::InvoiceVoided,
        format!("invoice:{}", invoice.id),
    )
    .with_before(json!({ "status": invoice.status }))
    .with_after(json!({ "status": voided.status }));
    if let Some(reason) = reason {
        audit = audit.with_reason(reason);
    }
    tx.append_audit_log(audit)?;

    Ok(voided)
}

pub struct PaymentRecorderUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
}

impl<S> PaymentRecorderUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn refund_payment(
        &self,
        payment_id: Uuid,
        actor: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> UseCaseResult<PaymentDto> {
        self.store
            .with_transaction(|tx| refund_payment(tx, payment_id, actor, reason, now))
            .map(PaymentDto::from)
            .inspect(|_| info!(%payment_id, actor, "payments: payment refunded"))
            .inspect_err(|err| match err {
                PaymentRecordError::Internal(err) => {
                    error!(%payment_id, db_error = ?err, "payments: refund failed");
                }
                other => {
                    warn!(%payment_id, code = other.code(), "payments: refund rejected");
                }
            })
    }

    pub fn void_invoice(
        &self,
        invoice_id: Uuid,
        actor: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> UseCaseResult<InvoiceDto> {
        self.store
            .with_transaction(|tx| void_invoice(tx, invoice_id, actor, reason, now))
            .map(InvoiceDto::from)
            .inspect(|_| info!(%invoice_id, actor, "payments: invoice voided"))
            .inspect_err(|err| match err {
                PaymentRecordError::Internal(err) => {
                    error!(%invoice_id, db_error = ?err, "payments: void failed");
                }
                other => {
                    warn!(%invoice_id, code = other.code(), "payments: void rejected");
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::{
        domain::{
            entities::checkout_sessions::InsertCheckoutSessionEntity,
            repositories::checkout_sessions::CheckoutSessionRepository,
            value_objects::enums::{plan_cycles::PlanCycle, purchase_types::PurchaseType},
        },
        infra::memory::InMemoryBillingStore,
    };

    fn seed_session(store: &InMemoryBillingStore, provider: PaymentProvider) -> CheckoutSessionEntity {
        store.seed(|state| {
            let price = state.seed_subscription_price(PlanCycle::Monthly, 250_000);
            state
                .insert_checkout_session(InsertCheckoutSessionEntity {
                    user_id: Uuid::new_v4(),
                    provider: provider.to_string(),
                    price_id: Some(price.price_id),
                    purchase_type: PurchaseType::Subscription.to_string(),
                    enrollment_id: None,
                    installment_index: None,
                    amount: 250_000,
                    currency: "IRR".to_string(),
                    idempotency_key: Uuid::new_v4().to_string(),
                    return_url: "https://app.test/return".to_string(),
                })
                .unwrap()
                .unwrap()
        })
    }

    fn webhook(session_id: Uuid, transaction_id: &str, outcome: PaymentOutcome, amount: i64) -> VerifiedWebhook {
        VerifiedWebhook {
            external_id: format!("{transaction_id}:{outcome:?}"),
            session_id,
            provider_transaction_id: transaction_id.to_string(),
            outcome,
            amount,
            payload: json!({}),
        }
    }

    fn record(
        store: &InMemoryBillingStore,
        provider: PaymentProvider,
        webhook: &VerifiedWebhook,
    ) -> UseCaseResult<RecordedPayment> {
        store.with_transaction(|tx| record_payment_outcome(tx, provider, webhook, Utc::now()))
    }

    #[test]
    fn retried_transactions_for_one_session_collapse_into_one_payment() {
        let store = InMemoryBillingStore::new();
        let session = seed_session(&store, PaymentProvider::Zarinpal);

        let failed = record(
            &store,
            PaymentProvider::Zarinpal,
            &webhook(session.id, "A1", PaymentOutcome::Failed, 250_000),
        )
        .unwrap();
        assert!(!failed.newly_paid);
        assert!(failed.invoice.is_none());

        let paid = record(
            &store,
            PaymentProvider::Zarinpal,
            &webhook(session.id, "A2", PaymentOutcome::Paid, 250_000),
        )
        .unwrap();
        assert!(paid.newly_paid);
        assert_eq!(paid.payment.id, failed.payment.id);
        assert_eq!(paid.payment.provider_transaction_id.as_deref(), Some("A2"));

        let state = store.snapshot();
        assert_eq!(state.payments.len(), 1);
        assert_eq!(state.invoices.len(), 1);
        assert_eq!(state.invoices[0].total, 250_000);
        assert_eq!(state.invoices[0].status(), Some(InvoiceStatus::Paid));
    }

    #[test]
    fn paid_payment_is_never_downgraded_and_invoice_stays_single() {
        let store = InMemoryBillingStore::new();
        let session = seed_session(&store, PaymentProvider::IdPay);

        record(
            &store,
            PaymentProvider::IdPay,
            &webhook(session.id, "T1", PaymentOutcome::Paid, 250_000),
        )
        .unwrap();
        let late_failure = record(
            &store,
            PaymentProvider::IdPay,
            &webhook(session.id, "T1", PaymentOutcome::Failed, 250_000),
        )
        .unwrap();
        let repeat = record(
            &store,
            PaymentProvider::IdPay,
            &webhook(session.id, "T1", PaymentOutcome::Paid, 250_000),
        )
        .unwrap();

        assert!(late_failure.payment.is_paid());
        assert!(!repeat.newly_paid);
        assert_eq!(store.snapshot().invoices.len(), 1);
    }

    #[test]
    fn amount_and_provider_mismatches_are_rejected() {
        let store = InMemoryBillingStore::new();
        let session = seed_session(&store, PaymentProvider::PayPing);

        let err = record(
            &store,
            PaymentProvider::PayPing,
            &webhook(session.id, "R1", PaymentOutcome::Paid, 1),
        )
        .unwrap_err();
        assert!(matches!(err, PaymentRecordError::AmountMismatch { expected: 250_000, actual: 1 }));

        let err = record(
            &store,
            PaymentProvider::Zarinpal,
            &webhook(session.id, "R1", PaymentOutcome::Paid, 250_000),
        )
        .unwrap_err();
        assert_eq!(err.code(), "PROVIDER_MISMATCH");
        assert!(store.snapshot().payments.is_empty());
    }

    #[test]
    fn refund_moves_payment_and_invoice_and_audits() {
        let store = Arc::new(InMemoryBillingStore::new());
        let session = seed_session(&store, PaymentProvider::Zarinpal);
        let recorded = record(
            &store,
            PaymentProvider::Zarinpal,
            &webhook(session.id, "A9", PaymentOutcome::Paid, 250_000),
        )
        .unwrap();
        let usecase = PaymentRecorderUseCase::new(Arc::clone(&store));

        let refunded = usecase
            .refund_payment(recorded.payment.id, "operator", Some("duplicate charge".to_string()), Utc::now())
            .unwrap();

        assert_eq!(refunded.status, PaymentStatus::Refunded.as_str());
        let state = store.snapshot();
        assert_eq!(state.invoices[0].status(), Some(InvoiceStatus::Refunded));
        assert!(
            state
                .audit_logs
                .iter()
                .any(|a| a.action == AuditAction::PaymentRefunded.as_str())
        );

        let err = usecase
            .refund_payment(recorded.payment.id, "operator", None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, PaymentRecordError::NotRefundable(_)));
    }

    #[test]
    fn only_draft_invoices_can_be_voided() {
        let store = Arc::new(InMemoryBillingStore::new());
        let session = seed_session(&store, PaymentProvider::Zarinpal);
        let recorded = record(
            &store,
            PaymentProvider::Zarinpal,
            &webhook(session.id, "A3", PaymentOutcome::Paid, 250_000),
        )
        .unwrap();
        let invoice_id = recorded.invoice.unwrap().id;
        let usecase = PaymentRecorderUseCase::new(Arc::clone(&store));

        let err = usecase
            .void_invoice(invoice_id, "operator", None, Utc::now())
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);

        store.seed(|state| state.invoices[0].status = InvoiceStatus::Draft.to_string());
        let voided = usecase
            .void_invoice(invoice_id, "operator", Some("issued by mistake".to_string()), Utc::now())
            .unwrap();
        assert_eq!(voided.status, InvoiceStatus::Void.as_str());
    }
}
