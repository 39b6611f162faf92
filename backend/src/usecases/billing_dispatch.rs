use std::sync::Arc;
use billing_core::domain::repositories::{checkout_sessions::CheckoutSessionRepository, payments::PaymentRepository};

use anyhow::Context;
use billing_core::domain::{
    repositories::{BillingTx, TransactionManager},
    value_objects::{
        billing::DispatchEffect,
        enums::purchase_types::PurchaseType,
        webhooks::PaymentOutcome,
    },
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::{
    course_installments::{CourseError, apply_course_payment},
    job_credits::{JobCreditError, grant_job_credits},
    payment_recorder::RecordedPayment,
    subscription_lifecycle::{SubscriptionError, apply_payment_to_subscription},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("payment not found")]
    PaymentNotFound,
    #[error("payment is {0}, only paid payments can be applied")]
    PaymentNotPaid(String),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    JobCredit(#[from] JobCreditError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            DispatchError::PaymentNotFound => StatusCode::NOT_FOUND,
            DispatchError::PaymentNotPaid(_) => StatusCode::CONFLICT,
            DispatchError::Subscription(err) => err.status_code(),
            DispatchError::JobCredit(err) => err.status_code(),
            DispatchError::Course(err) => err.status_code(),
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            DispatchError::PaymentNotPaid(_) => "PAYMENT_NOT_PAID",
            DispatchError::Subscription(err) => err.code(),
            DispatchError::JobCredit(err) => err.code(),
            DispatchError::Course(err) => err.code(),
            DispatchError::Internal(_) => "INTERNAL",
        }
    }

    /// Infrastructure fault somewhere below, as opposed to a rejected payment.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            DispatchError::Internal(_)
                | DispatchError::Subscription(SubscriptionError::Internal(_))
                | DispatchError::JobCredit(JobCreditError::Internal(_))
                | DispatchError::Course(CourseError::Internal(_))
        )
    }
}

pub type UseCaseResult<T> = std::result::Result<T, DispatchError>;

/// Routes a recorded payment to the domain its checkout session was opened for. Subscription
/// and job credit effects only follow a paid payment; courses also track failed installments.
pub fn dispatch_payment_outcome<T: BillingTx>(
    tx: &mut T,
    recorded: &RecordedPayment,
    outcome: PaymentOutcome,
    now: DateTime<Utc>,
) -> UseCaseResult<DispatchEffect> {
    let RecordedPayment {
        payment, session, ..
    } = recorded;

    let Some(purchase_type) = session.purchase_type() else {
        warn!(
            session_id = %session.id,
            purchase_type = %session.purchase_type,
            "dispatch: unknown purchase type on checkout session"
        );
        return Ok(DispatchEffect::None);
    };

    let effect = match (purchase_type, payment.is_paid()) {
        (PurchaseType::Subscription, true) => DispatchEffect::Subscription {
            outcome: apply_payment_to_subscription(tx, payment, now)?,
        },
        (PurchaseType::JobCredit, true) => DispatchEffect::JobCredit {
            outcome: grant_job_credits(tx, payment, session, now)?,
        },
        (PurchaseType::CourseSemester, _) => DispatchEffect::Course {
            outcome: apply_course_payment(tx, payment, session, outcome, now)?,
        },
        (_, false) => DispatchEffect::None,
    };

    Ok(effect)
}

pub struct BillingDispatchUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
}

impl<S> BillingDispatchUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Return-URL confirmation: re-applies the effects of a payment that is already paid.
    /// Safe to call any number of times.
    pub fn apply_paid_payment(
        &self,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<DispatchEffect> {
        let result = self.store.with_transaction(|tx| {
            let payment = tx
                .lock_payment(payment_id)?
                .ok_or(DispatchError::PaymentNotFound)?;
            if !payment.is_paid() {
                return Err(DispatchError::PaymentNotPaid(payment.status.clone()));
            }
            let session = tx
                .find_checkout_session(payment.checkout_session_id)?
                .context("payment references a missing checkout session")?;

            let recorded = RecordedPayment {
                payment,
                session,
                newly_paid: false,
                invoice: None,
            };
            dispatch_payment_outcome(tx, &recorded, PaymentOutcome::Paid, now)
        });

        match &result {
            Ok(effect) => info!(%payment_id, ?effect, "dispatch: paid payment applied"),
            Err(err) if err.is_internal() => {
                error!(%payment_id, db_error = ?err, "dispatch: failed to apply payment");
            }
            Err(err) => warn!(%payment_id, code = err.code(), "dispatch: payment not applied"),
        }

        result
    }
}
