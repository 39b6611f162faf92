use std::sync::Arc;
use billing_core::domain::repositories::{catalog::CatalogRepository, payments::PaymentRepository, subscriptions::SubscriptionRepository};

use anyhow::Context;
use billing_core::domain::{
    entities::{
        audit_logs::{InsertAuditLogEntity, payment_resource},
        payments::PaymentEntity,
        plans::PlanEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    },
    repositories::{BillingTx, TransactionManager},
    value_objects::{
        billing::{NotAppliedReason, SubscriptionApplyOutcome},
        enums::{
            audit_actions::AuditAction, purchase_types::ProductType,
            subscription_statuses::SubscriptionStatus,
        },
        subscriptions::{SubscriptionDto, SubscriptionPeriod},
    },
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::entitlement_sync::{ensure_publish_entitlement, sync_single_user};

pub const WEBHOOK_ACTOR: &str = "system:webhook";

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription not found")]
    NotFound,
    #[error("plan not found")]
    PlanNotFound,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("subscription is {0} and cannot change this way")]
    InvalidState(SubscriptionStatus),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::NotFound
            | SubscriptionError::PlanNotFound
            | SubscriptionError::PaymentNotFound => StatusCode::NOT_FOUND,
            SubscriptionError::InvalidState(_) => StatusCode::CONFLICT,
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SubscriptionError::NotFound => "SUBSCRIPTION_NOT_FOUND",
            SubscriptionError::PlanNotFound => "PLAN_NOT_FOUND",
            SubscriptionError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            SubscriptionError::InvalidState(_) => "INVALID_SUBSCRIPTION_STATE",
            SubscriptionError::Internal(_) => "INTERNAL",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

/// Starts a fresh period on `plan`. An existing row for the user is restarted in place;
/// the second value reports whether that happened. A row another transaction inserted
/// concurrently is extended by one cycle instead.
pub fn activate_or_start<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    plan: &PlanEntity,
    provider_ref: Option<String>,
    now: DateTime<Utc>,
) -> UseCaseResult<(SubscriptionEntity, bool)> {
    let period = SubscriptionPeriod::starting_now(plan.cycle, now)?;

    let existing = match tx.lock_subscription_by_user(user_id)? {
        Some(existing) => existing,
        None => {
            let inserted = tx.insert_subscription(InsertSubscriptionEntity {
                user_id,
                plan_id: plan.id,
                status: SubscriptionStatus::Active.to_string(),
                started_at: period.starts_at,
                ends_at: period.ends_at,
                renewal_at: Some(period.ends_at),
                cancel_at_period_end: false,
                provider_ref: provider_ref.clone(),
            })?;
            match inserted {
                Some(subscription) => return Ok((subscription, false)),
                None => {
                    let winner = tx
                        .lock_subscription_by_user(user_id)?
                        .context("subscription vanished after insert conflict")?;
                    // Lost the insert race to a concurrent payment: its period stands and
                    // this one stacks on it.
                    if winner.grants_access(now) {
                        info!(%user_id, subscription_id = %winner.id, "subscriptions: lost start race, extending instead");
                        let extended = renew(tx, user_id, Some(plan), provider_ref, now)?;
                        return Ok((extended, false));
                    }
                    winner
                }
            }
        }
    };

    let mut restarted = existing;
    restarted.plan_id = plan.id;
    restarted.status = SubscriptionStatus::Active.to_string();
    restarted.started_at = period.starts_at;
    restarted.ends_at = period.ends_at;
    restarted.renewal_at = Some(period.ends_at);
    restarted.cancel_at_period_end = false;
    restarted.canceled_at = None;
    restarted.provider_ref = provider_ref.or(restarted.provider_ref);
    restarted.updated_at = now;

    Ok((tx.save_subscription(&restarted)?, true))
}

/// Extends the user's subscription by one cycle of `plan` (or its current plan), stacking on
/// the running period or restarting from `now` once it has lapsed.
pub fn renew<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    plan: Option<&PlanEntity>,
    provider_ref: Option<String>,
    now: DateTime<Utc>,
) -> UseCaseResult<SubscriptionEntity> {
    let mut subscription = tx
        .lock_subscription_by_user(user_id)?
        .ok_or(SubscriptionError::NotFound)?;

    let plan = match plan {
        Some(plan) => plan.clone(),
        None => tx
            .find_plan(subscription.plan_id)?
            .ok_or(SubscriptionError::PlanNotFound)?,
    };

    let period = SubscriptionPeriod::renewal(plan.cycle, subscription.ends_at, now)?;
    if period.starts_at == now {
        subscription.started_at = now;
    }
    subscription.plan_id = plan.id;
    subscription.status = SubscriptionStatus::Active.to_string();
    subscription.ends_at = period.ends_at;
    subscription.renewal_at = Some(period.ends_at);
    subscription.cancel_at_period_end = false;
    subscription.canceled_at = None;
    subscription.provider_ref = provider_ref.or(subscription.provider_ref);
    subscription.updated_at = now;

    Ok(tx.save_subscription(&subscription)?)
}

pub fn set_cancel_at_period_end<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    cancel: bool,
    now: DateTime<Utc>,
) -> UseCaseResult<SubscriptionEntity> {
    let mut subscription = tx
        .lock_subscription_by_user(user_id)?
        .ok_or(SubscriptionError::NotFound)?;

    let status = subscription.status();
    if !status.is_active_family() {
        return Err(SubscriptionError::InvalidState(status));
    }

    subscription.cancel_at_period_end = cancel;
    subscription.status = if cancel {
        SubscriptionStatus::Renewing
    } else {
        SubscriptionStatus::Active
    }
    .to_string();
    subscription.updated_at = now;

    Ok(tx.save_subscription(&subscription)?)
}

/// Marks the subscription expired without touching `ends_at`.
pub fn mark_expired<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> UseCaseResult<SubscriptionEntity> {
    let mut subscription = tx
        .lock_subscription_by_user(user_id)?
        .ok_or(SubscriptionError::NotFound)?;

    if subscription.status() == SubscriptionStatus::Expired {
        return Ok(subscription);
    }

    subscription.status = SubscriptionStatus::Expired.to_string();
    subscription.updated_at = now;

    Ok(tx.save_subscription(&subscription)?)
}

/// Cancels immediately and pulls the publish entitlement in the same transaction.
pub fn cancel_now<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> UseCaseResult<SubscriptionEntity> {
    let mut subscription = tx
        .lock_subscription_by_user(user_id)?
        .ok_or(SubscriptionError::NotFound)?;

    match subscription.status() {
        SubscriptionStatus::Canceled => return Ok(subscription),
        SubscriptionStatus::Expired => {
            return Err(SubscriptionError::InvalidState(SubscriptionStatus::Expired));
        }
        SubscriptionStatus::Active | SubscriptionStatus::Renewing => {}
    }

    subscription.status = SubscriptionStatus::Canceled.to_string();
    subscription.cancel_at_period_end = false;
    subscription.canceled_at = Some(now);
    subscription.updated_at = now;
    let saved = tx.save_subscription(&subscription)?;

    sync_single_user(tx, user_id, now)?;

    Ok(saved)
}

/// Turns a paid subscription payment into a running subscription and a publish entitlement.
///
/// Guarded by the `SUBSCRIPTION_GRANTED` audit marker on the payment: a repeat call records a
/// `DUPLICATE_GUARD` entry and changes nothing else.
pub fn apply_payment_to_subscription<T: BillingTx>(
    tx: &mut T,
    payment: &PaymentEntity,
    now: DateTime<Utc>,
) -> UseCaseResult<SubscriptionApplyOutcome> {
    let not_applied = |reason| Ok(SubscriptionApplyOutcome::NotApplied { reason });

    if !payment.is_paid() {
        return not_applied(NotAppliedReason::PaymentNotPaid);
    }

    let Some(session) = tx.find_checkout_session(payment.checkout_session_id)? else {
        return not_applied(NotAppliedReason::NotSubscriptionProduct);
    };
    let Some(price) = session.price_id.map(|id| tx.find_price(id)).transpose()?.flatten() else {
        return not_applied(NotAppliedReason::NotSubscriptionProduct);
    };
    let is_subscription_product = tx
        .find_product(price.product_id)?
        .and_then(|product| product.product_type())
        == Some(ProductType::Subscription);
    if !is_subscription_product {
        return not_applied(NotAppliedReason::NotSubscriptionProduct);
    }
    let plan = price
        .plan_id
        .map(|plan_id| tx.find_plan(plan_id))
        .transpose()?
        .flatten()
        .ok_or(SubscriptionError::PlanNotFound)?;

    let resource = payment_resource(payment.id);
    if tx.has_audit_marker(&resource, AuditAction::SubscriptionGranted)? {
        tx.append_audit_log(
            InsertAuditLogEntity::new(WEBHOOK_ACTOR, AuditAction::DuplicateGuard, resource)
                .with_reason(AuditAction::SubscriptionGranted.as_str()),
        )?;
        info!(payment_id = %payment.id, "subscriptions: payment already applied");
        return not_applied(NotAppliedReason::AlreadyGranted);
    }

    let user_id = payment.user_id;
    let provider_ref = Some(payment.provider_ref.clone());
    let before = tx.lock_subscription_by_user(user_id)?;

    // A canceled or expired row is restarted rather than stacked on.
    let (subscription, restarted) = match &before {
        Some(current) if current.grants_access(now) => {
            (renew(tx, user_id, Some(&plan), provider_ref, now)?, false)
        }
        _ => activate_or_start(tx, user_id, &plan, provider_ref, now)?,
    };

    ensure_publish_entitlement(tx, user_id, subscription.ends_at, Some(payment.id), now)?;

    tx.append_audit_log(
        InsertAuditLogEntity::new(WEBHOOK_ACTOR, AuditAction::SubscriptionGranted, resource)
            .with_before(json!(before.map(SubscriptionDto::from)))
            .with_after(json!(SubscriptionDto::from(subscription.clone()))),
    )?;

    info!(
        %user_id,
        payment_id = %payment.id,
        subscription_id = %subscription.id,
        ends_at = %subscription.ends_at,
        "subscriptions: payment applied"
    );

    Ok(SubscriptionApplyOutcome::Applied {
        subscription_id: subscription.id,
        status: subscription.status(),
        ends_at: subscription.ends_at,
        restarted,
    })
}

pub struct SubscriptionLifecycleUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
}

impl<S> SubscriptionLifecycleUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn current_subscription(&self, user_id: Uuid) -> UseCaseResult<SubscriptionDto> {
        self.store
            .with_transaction(|tx| {
                tx.find_subscription_by_user(user_id)?
                    .map(SubscriptionDto::from)
                    .ok_or(SubscriptionError::NotFound)
            })
            .inspect_err(|err| log_failure(user_id, "load", err))
    }

    pub fn activate_or_start(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.store
            .with_transaction(|tx| {
                let plan = tx
                    .find_plan(plan_id)?
                    .ok_or(SubscriptionError::PlanNotFound)?;
                let (subscription, _) = activate_or_start(tx, user_id, &plan, provider_ref, now)?;
                ensure_publish_entitlement(tx, user_id, subscription.ends_at, None, now)?;
                Ok(SubscriptionDto::from(subscription))
            })
            .inspect_err(|err| log_failure(user_id, "activate", err))
    }

    pub fn renew(
        &self,
        user_id: Uuid,
        provider_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.store
            .with_transaction(|tx| {
                let subscription = renew(tx, user_id, None, provider_ref, now)?;
                ensure_publish_entitlement(tx, user_id, subscription.ends_at, None, now)?;
                Ok(SubscriptionDto::from(subscription))
            })
            .inspect_err(|err| log_failure(user_id, "renew", err))
    }

    pub fn set_cancel_at_period_end(
        &self,
        user_id: Uuid,
        cancel: bool,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionDto> {
        self.store
            .with_transaction(|tx| set_cancel_at_period_end(tx, user_id, cancel, now))
            .map(SubscriptionDto::from)
            .inspect_err(|err| log_failure(user_id, "toggle cancel at period end", err))
    }

    pub fn mark_expired(&self, user_id: Uuid, now: DateTime<Utc>) -> UseCaseResult<SubscriptionDto> {
        self.store
            .with_transaction(|tx| mark_expired(tx, user_id, now))
            .map(SubscriptionDto::from)
            .inspect_err(|err| log_failure(user_id, "expire", err))
    }

    pub fn cancel_now(&self, user_id: Uuid, now: DateTime<Utc>) -> UseCaseResult<SubscriptionDto> {
        self.store
            .with_transaction(|tx| cancel_now(tx, user_id, now))
            .map(SubscriptionDto::from)
            .inspect_err(|err| log_failure(user_id, "cancel", err))
    }

    pub fn apply_payment_to_subscription(
        &self,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionApplyOutcome> {
        self.store.with_transaction(|tx| {
            let payment = tx
                .lock_payment(payment_id)?
                .ok_or(SubscriptionError::PaymentNotFound)?;
            apply_payment_to_subscription(tx, &payment, now)
        })
    }
}

fn log_failure(user_id: Uuid, action: &str, err: &SubscriptionError) {
    match err {
        SubscriptionError::Internal(err) => {
            error!(%user_id, action, db_error = ?err, "subscriptions: operation failed");
        }
        other => {
            warn!(
                %user_id,
                action,
                status = other.status_code().as_u16(),
                error = %other,
                "subscriptions: operation rejected"
            );
        }
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
                entitlement_keys::EntitlementKey, payment_providers::PaymentProvider,
                payment_statuses::PaymentStatus, plan_cycles::PlanCycle,
                purchase_types::PurchaseType,
            },
        },
        infra::memory::{InMemoryBillingStore, InMemoryState},
    };
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn paid_subscription_payment(
        state: &mut InMemoryState,
        user_id: Uuid,
        cycle: PlanCycle,
        now: DateTime<Utc>,
    ) -> PaymentEntity {
        let price = state.seed_subscription_price(cycle, 500_000);
        let session = state
            .insert_checkout_session(InsertCheckoutSessionEntity {
                user_id,
                provider: PaymentProvider::Zarinpal.to_string(),
                price_id: Some(price.price_id),
                purchase_type: PurchaseType::Subscription.to_string(),
                enrollment_id: None,
                installment_index: None,
                amount: 500_000,
                currency: "IRR".to_string(),
                idempotency_key: Uuid::new_v4().to_string(),
                return_url: "https://app.test/billing/return".to_string(),
            })
            .unwrap()
            .unwrap();
        state
            .insert_payment(InsertPaymentEntity {
                user_id,
                provider: session.provider.clone(),
                provider_ref: session.provider_ref(),
                provider_transaction_id: Some("A0001".to_string()),
                checkout_session_id: session.id,
                status: PaymentStatus::Paid.to_string(),
                amount: 500_000,
                currency: "IRR".to_string(),
                paid_at: Some(now),
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn first_monthly_payment_starts_subscription_and_grants_entitlement() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let now = at(2025, 1, 1);
        let payment =
            store.seed(|state| paid_subscription_payment(state, user_id, PlanCycle::Monthly, now));
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));

        let outcome = usecase.apply_payment_to_subscription(payment.id, now).unwrap();

        assert!(outcome.is_applied());
        let state = store.snapshot();
        let subscription = state.subscription_of(user_id).unwrap();
        assert_eq!(subscription.status(), SubscriptionStatus::Active);
        assert_eq!(subscription.ends_at, at(2025, 2, 1));
        let entitlements = state.entitlements_of(user_id, EntitlementKey::CanPublishProfile);
        assert_eq!(entitlements.len(), 1);
        assert_eq!(entitlements[0].expires_at, Some(at(2025, 2, 1)));

        let replay = usecase.apply_payment_to_subscription(payment.id, now).unwrap();

        assert_eq!(
            replay,
            SubscriptionApplyOutcome::NotApplied {
                reason: NotAppliedReason::AlreadyGranted
            }
        );
        let after_replay = store.snapshot();
        assert_eq!(after_replay.subscriptions, state.subscriptions);
        assert_eq!(after_replay.entitlements, state.entitlements);
        assert!(
            after_replay
                .audit_logs
                .iter()
                .any(|a| a.action == AuditAction::DuplicateGuard.as_str())
        );
    }

    #[test]
    fn renewal_payment_before_lapse_stacks_on_current_period() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));

        let first =
            store.seed(|state| paid_subscription_payment(state, user_id, PlanCycle::Monthly, at(2025, 1, 1)));
        usecase.apply_payment_to_subscription(first.id, at(2025, 1, 1)).unwrap();

        let renewal_time = at(2025, 2, 1) - Duration::hours(1);
        let second =
            store.seed(|state| paid_subscription_payment(state, user_id, PlanCycle::Monthly, renewal_time));
        let outcome = usecase
            .apply_payment_to_subscription(second.id, renewal_time)
            .unwrap();

        match outcome {
            SubscriptionApplyOutcome::Applied { ends_at, restarted, .. } => {
                assert_eq!(ends_at, at(2025, 3, 1));
                assert!(!restarted);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let state = store.snapshot();
        let entitlements = state.entitlements_of(user_id, EntitlementKey::CanPublishProfile);
        assert_eq!(entitlements.len(), 1);
        assert_eq!(entitlements[0].expires_at, Some(at(2025, 3, 1)));
    }

    #[test]
    fn concurrent_first_payments_stack_two_periods() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let now = at(2025, 1, 1);
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));
        let (first, second) = store.seed(|state| {
            (
                paid_subscription_payment(state, user_id, PlanCycle::Monthly, now),
                paid_subscription_payment(state, user_id, PlanCycle::Monthly, now),
            )
        });
        usecase.apply_payment_to_subscription(first.id, now).unwrap();

        // The second payment read no subscription before the first committed, so its
        // insert hits the unique user constraint.
        store.seed(|state| state.uncommitted_subscription_reads = 2);
        let outcome = usecase.apply_payment_to_subscription(second.id, now).unwrap();

        match outcome {
            SubscriptionApplyOutcome::Applied { ends_at, restarted, .. } => {
                assert_eq!(ends_at, at(2025, 3, 1));
                assert!(!restarted);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let state = store.snapshot();
        assert_eq!(state.subscriptions.len(), 1);
        assert_eq!(state.subscriptions[0].started_at, now);
        let entitlements = state.entitlements_of(user_id, EntitlementKey::CanPublishProfile);
        assert_eq!(entitlements.len(), 1);
        assert_eq!(entitlements[0].expires_at, Some(at(2025, 3, 1)));
    }

    #[test]
    fn renewal_after_lapse_restarts_from_now() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));
        let plan_id = store.seed(|state| {
            state
                .seed_subscription_price(PlanCycle::Monthly, 100_000)
                .plan_id
                .unwrap()
        });
        usecase
            .activate_or_start(user_id, plan_id, None, at(2025, 1, 1))
            .unwrap();

        let late = at(2025, 2, 3);
        let renewed = usecase.renew(user_id, None, late).unwrap();

        assert_eq!(renewed.started_at, late);
        assert_eq!(renewed.ends_at, at(2025, 3, 3));
        assert_eq!(renewed.status, SubscriptionStatus::Active);
    }

    #[test]
    fn renew_without_subscription_is_not_found() {
        let store = Arc::new(InMemoryBillingStore::new());
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));

        let err = usecase
            .renew(Uuid::new_v4(), None, at(2025, 1, 1))
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::NotFound));
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn cancel_at_period_end_toggles_between_active_and_renewing() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));
        let plan_id = store.seed(|state| {
            state
                .seed_subscription_price(PlanCycle::Quarterly, 100_000)
                .plan_id
                .unwrap()
        });
        usecase
            .activate_or_start(user_id, plan_id, None, at(2025, 1, 1))
            .unwrap();

        let flagged = usecase
            .set_cancel_at_period_end(user_id, true, at(2025, 1, 2))
            .unwrap();
        assert!(flagged.cancel_at_period_end);
        assert_eq!(flagged.status, SubscriptionStatus::Renewing);
        assert_eq!(flagged.ends_at, at(2025, 4, 1));

        let cleared = usecase
            .set_cancel_at_period_end(user_id, false, at(2025, 1, 3))
            .unwrap();
        assert!(!cleared.cancel_at_period_end);
        assert_eq!(cleared.status, SubscriptionStatus::Active);
    }

    #[test]
    fn cancel_now_revokes_entitlement() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));
        let plan_id = store.seed(|state| {
            state.seed_profile(user_id, true);
            state
                .seed_subscription_price(PlanCycle::Yearly, 100_000)
                .plan_id
                .unwrap()
        });
        usecase
            .activate_or_start(user_id, plan_id, None, at(2025, 1, 1))
            .unwrap();

        let now = at(2025, 2, 1);
        let canceled = usecase.cancel_now(user_id, now).unwrap();

        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        let state = store.snapshot();
        assert!(
            state
                .entitlements_of(user_id, EntitlementKey::CanPublishProfile)
                .iter()
                .all(|e| !e.is_active(now))
        );
        assert_eq!(state.profiles.get(&user_id), Some(&false));

        let err = usecase.set_cancel_at_period_end(user_id, true, now).unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::InvalidState(SubscriptionStatus::Canceled)
        ));
    }

    #[test]
    fn mark_expired_keeps_period_end() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));
        let plan_id = store.seed(|state| {
            state
                .seed_subscription_price(PlanCycle::Monthly, 100_000)
                .plan_id
                .unwrap()
        });
        usecase
            .activate_or_start(user_id, plan_id, None, at(2025, 1, 1))
            .unwrap();

        let expired = usecase.mark_expired(user_id, at(2025, 2, 2)).unwrap();

        assert_eq!(expired.status, SubscriptionStatus::Expired);
        assert_eq!(expired.ends_at, at(2025, 2, 1));
    }

    #[test]
    fn job_credit_payment_is_not_a_subscription_product() {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let now = at(2025, 1, 1);
        let payment = store.seed(|state| {
            let payment = paid_subscription_payment(state, user_id, PlanCycle::Monthly, now);
            let credits = state.seed_job_credit_price(50_000, 5);
            let session = state
                .checkout_sessions
                .iter_mut()
                .find(|s| s.id == payment.checkout_session_id)
                .unwrap();
            session.price_id = Some(credits.price_id);
            payment
        });
        let usecase = SubscriptionLifecycleUseCase::new(Arc::clone(&store));

        let outcome = usecase.apply_payment_to_subscription(payment.id, now).unwrap();

        assert_eq!(
            outcome,
            SubscriptionApplyOutcome::NotApplied {
                reason: NotAppliedReason::NotSubscriptionProduct
            }
        );
        assert!(store.snapshot().subscription_of(user_id).is_none());
    }
}
