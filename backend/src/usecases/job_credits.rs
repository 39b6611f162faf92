use std::sync::Arc;
use billing_core::domain::repositories::{checkout_sessions::CheckoutSessionRepository, entitlements::EntitlementRepository, payments::PaymentRepository};

use billing_core::domain::{
    entities::{
        audit_logs::{InsertAuditLogEntity, payment_resource},
        checkout_sessions::CheckoutSessionEntity,
        job_credit_grants::InsertJobCreditGrantEntity,
        payments::PaymentEntity,
    },
    repositories::{BillingTx, TransactionManager},
    value_objects::{
        billing::{JobCreditApplyOutcome, NotAppliedReason},
        enums::{
            audit_actions::AuditAction, entitlement_keys::EntitlementKey,
            purchase_types::ProductType,
        },
    },
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::subscription_lifecycle::WEBHOOK_ACTOR;

#[derive(Debug, Error)]
pub enum JobCreditError {
    #[error("payment not found")]
    PaymentNotFound,
    #[error("no job post credits left")]
    NoCredits,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl JobCreditError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            JobCreditError::PaymentNotFound => StatusCode::NOT_FOUND,
            JobCreditError::NoCredits => StatusCode::PAYMENT_REQUIRED,
            JobCreditError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            JobCreditError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            JobCreditError::NoCredits => "NO_CREDITS",
            JobCreditError::Internal(_) => "INTERNAL",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, JobCreditError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditBalanceDto {
    pub remaining_credits: i32,
}

/// Tops up the user's job post balance from a paid credit-pack payment, at most once per
/// payment.
pub fn grant_job_credits<T: BillingTx>(
    tx: &mut T,
    payment: &PaymentEntity,
    session: &CheckoutSessionEntity,
    now: DateTime<Utc>,
) -> UseCaseResult<JobCreditApplyOutcome> {
    let not_applied = |reason| Ok(JobCreditApplyOutcome::NotApplied { reason });

    if !payment.is_paid() {
        return not_applied(NotAppliedReason::PaymentNotPaid);
    }

    let Some(price) = session.price_id.map(|id| tx.find_price(id)).transpose()?.flatten() else {
        return not_applied(NotAppliedReason::NotJobCreditProduct);
    };
    let is_credit_product = tx
        .find_product(price.product_id)?
        .and_then(|product| product.product_type())
        == Some(ProductType::JobCredit);
    if !is_credit_product {
        return not_applied(NotAppliedReason::NotJobCreditProduct);
    }

    let Some(credits) = price.metadata.job_post_credits.filter(|credits| *credits > 0) else {
        warn!(price_id = %price.id, "job credits: price has no job_post_credits configured");
        return not_applied(NotAppliedReason::NoCreditsConfigured);
    };

    let resource = payment_resource(payment.id);
    let grant = tx.insert_job_credit_grant(InsertJobCreditGrantEntity {
        payment_id: payment.id,
        user_id: payment.user_id,
        credits,
    })?;
    if grant.is_none() {
        tx.append_audit_log(
            InsertAuditLogEntity::new(WEBHOOK_ACTOR, AuditAction::DuplicateGuard, resource)
                .with_reason(AuditAction::JobCreditGranted.as_str()),
        )?;
        info!(payment_id = %payment.id, "job credits: payment already granted");
        return not_applied(NotAppliedReason::AlreadyGranted);
    }

    let remaining_credits = tx.add_entitlement_credits(
        payment.user_id,
        EntitlementKey::JobPostCredit,
        credits,
        payment.id,
        now,
    )?;

    tx.append_audit_log(
        InsertAuditLogEntity::new(WEBHOOK_ACTOR, AuditAction::JobCreditGranted, resource)
            .with_after(json!({ "credits": credits, "remaining_credits": remaining_credits })),
    )?;

    info!(
        user_id = %payment.user_id,
        payment_id = %payment.id,
        credits,
        remaining_credits,
        "job credits: granted"
    );

    Ok(JobCreditApplyOutcome::Applied {
        credits,
        remaining_credits,
    })
}

pub struct JobCreditUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
}

impl<S> JobCreditUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn grant_job_credits(
        &self,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<JobCreditApplyOutcome> {
        self.store.with_transaction(|tx| {
            let payment = tx
                .lock_payment(payment_id)?
                .ok_or(JobCreditError::PaymentNotFound)?;
            let Some(session) = tx.find_checkout_session(payment.checkout_session_id)? else {
                return Ok(JobCreditApplyOutcome::NotApplied {
                    reason: NotAppliedReason::NotJobCreditProduct,
                });
            };
            grant_job_credits(tx, &payment, &session, now)
        })
    }

    /// Spends one credit. The balance never goes below zero.
    pub fn consume_job_credit(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<CreditBalanceDto> {
        let remaining = self
            .store
            .with_transaction(|tx| tx.take_entitlement_credit(user_id, EntitlementKey::JobPostCredit, now))
            .map_err(|err: anyhow::Error| {
                error!(%user_id, db_error = ?err, "job credits: failed to consume credit");
                JobCreditError::Internal(err)
            })?;

        match remaining {
            Some(remaining_credits) => {
                info!(%user_id, remaining_credits, "job credits: credit consumed");
                Ok(CreditBalanceDto { remaining_credits })
            }
            None => {
                warn!(%user_id, "job credits: no credit left to consume");
                Err(JobCreditError::NoCredits)
            }
        }
    }

    pub fn balance(&self, user_id: Uuid) -> UseCaseResult<CreditBalanceDto> {
        let remaining_credits = self
            .store
            .with_transaction(|tx| tx.credit_balance(user_id, EntitlementKey::JobPostCredit))?;
        Ok(CreditBalanceDto { remaining_credits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::{
        domain::{
            entities::{
                checkout_sessions::InsertCheckoutSessionEntity, payments::InsertPaymentEntity,
            },
            repositories::{
                checkout_sessions::CheckoutSessionRepository, payments::PaymentRepository,
            },
            value_objects::enums::{
                payment_providers::PaymentProvider, payment_statuses::PaymentStatus,
                purchase_types::PurchaseType,
            },
        },
        infra::memory::{InMemoryBillingStore, InMemoryState},
    };

    fn paid_credit_payment(state: &mut InMemoryState, user_id: Uuid, credits: i32) -> PaymentEntity {
        let price = state.seed_job_credit_price(90_000, credits);
        let session = state
            .insert_checkout_session(InsertCheckoutSessionEntity {
                user_id,
                provider: PaymentProvider::IdPay.to_string(),
                price_id: Some(price.price_id),
                purchase_type: PurchaseType::JobCredit.to_string(),
                enrollment_id: None,
                installment_index: None,
                amount: 90_000,
                currency: "IRR".to_string(),
                idempotency_key: Uuid::new_v4().to_string(),
                return_url: "https://app.test/return".to_string(),
            })
            .unwrap()
            .unwrap();
        state
            .insert_payment(InsertPaymentEntity {
                user_id,
                provider: session.provider.clone(),
                provider_ref: session.provider_ref(),
                provider_transaction_id: Some("track-1".to_string()),
                checkout_session_id: session.id,
                status: PaymentStatus::Paid.to_string(),
                amount: 90_000,
                currency: "IRR".to_string(),
                paid_at: Some(Utc::now()),
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn grants_once_per_payment_and_accumulates_balance() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let first = store.seed(|state| paid_credit_payment(state, user_id, 5));
        let second = store.seed(|state| paid_credit_payment(state, user_id, 3));
        let usecase = JobCreditUseCase::new(Arc::clone(&store));

        let outcome = usecase.grant_job_credits(first.id, Utc::now()).unwrap();
        assert_eq!(
            outcome,
            JobCreditApplyOutcome::Applied {
                credits: 5,
                remaining_credits: 5
            }
        );

        let replay = usecase.grant_job_credits(first.id, Utc::now()).unwrap();
        assert_eq!(
            replay,
            JobCreditApplyOutcome::NotApplied {
                reason: NotAppliedReason::AlreadyGranted
            }
        );

        let outcome = usecase.grant_job_credits(second.id, Utc::now()).unwrap();
        assert_eq!(
            outcome,
            JobCreditApplyOutcome::Applied {
                credits: 3,
                remaining_credits: 8
            }
        );

        let state = store.snapshot();
        assert_eq!(state.job_credit_grants.len(), 2);
        assert_eq!(state.entitlements_of(user_id, EntitlementKey::JobPostCredit).len(), 1);
    }

    #[test]
    fn consume_stops_at_zero() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let payment = store.seed(|state| paid_credit_payment(state, user_id, 2));
        let usecase = JobCreditUseCase::new(Arc::clone(&store));
        usecase.grant_job_credits(payment.id, Utc::now()).unwrap();

        assert_eq!(usecase.consume_job_credit(user_id, Utc::now()).unwrap().remaining_credits, 1);
        assert_eq!(usecase.consume_job_credit(user_id, Utc::now()).unwrap().remaining_credits, 0);

        let err = usecase.consume_job_credit(user_id, Utc::now()).unwrap_err();
        assert!(matches!(err, JobCreditError::NoCredits));
        assert_eq!(usecase.balance(user_id).unwrap().remaining_credits, 0);
    }

    #[test]
    fn price_without_credits_is_not_applied() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let payment = store.seed(|state| paid_credit_payment(state, user_id, 0));
        let usecase = JobCreditUseCase::new(Arc::clone(&store));

        let outcome = usecase.grant_job_credits(payment.id, Utc::now()).unwrap();

        assert_eq!(
            outcome,
            JobCreditApplyOutcome::NotApplied {
                reason: NotAppliedReason::NoCreditsConfigured
            }
        );
        assert!(store.snapshot().job_credit_grants.is_empty());
    }
}
