use std::sync::Arc;
use billing_core::domain::repositories::{checkout_sessions::CheckoutSessionRepository, courses::CourseRepository, payments::PaymentRepository};

use anyhow::Context;
use billing_core::{
    domain::{
        entities::{
            audit_logs::{InsertAuditLogEntity, payment_resource},
            checkout_sessions::{CheckoutSessionEntity, InsertCheckoutSessionEntity},
            course_payments::{
                CoursePaymentInstallmentEntity, CoursePaymentPlanEntity,
                InsertCoursePaymentInstallmentEntity, InsertCoursePaymentPlanEntity,
            },
            courses::{EnrollmentEntity, SemesterEntity},
            payments::PaymentEntity,
        },
        repositories::{BillingTx, TransactionManager},
        value_objects::{
            billing::CourseApplyOutcome,
            checkout::{CheckoutOutcome, CheckoutRejection},
            course_pricing::{PricingBreakdown, course_checkout_idempotency_key},
            enums::{
                audit_actions::AuditAction,
                course_statuses::{
                    CoursePaymentMode, EnrollmentStatus, InstallmentStatus, SemesterStatus,
                },
                payment_providers::PaymentProvider,
                payment_statuses::PaymentStatus,
                purchase_types::PurchaseType,
            },
            webhooks::PaymentOutcome,
        },
    },
    payments::registry::ProviderRegistry,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::usecases::{
    checkout::{
        CheckoutError, CheckoutSettings, PreparedCheckout, issue_redirect, open_or_reuse_session,
    },
    subscription_lifecycle::WEBHOOK_ACTOR,
};

#[derive(Debug, Error)]
pub enum CourseError {
    #[error("enrollment not found")]
    EnrollmentNotFound,
    #[error("semester not found")]
    SemesterNotFound,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("enrollment pays by {expected}, payment was for {actual}")]
    PaymentModeMismatch {
        expected: CoursePaymentMode,
        actual: CoursePaymentMode,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CourseError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            CourseError::EnrollmentNotFound
            | CourseError::SemesterNotFound
            | CourseError::PaymentNotFound => StatusCode::NOT_FOUND,
            CourseError::PaymentModeMismatch { .. } => StatusCode::CONFLICT,
            CourseError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CourseError::EnrollmentNotFound => "ENROLLMENT_NOT_FOUND",
            CourseError::SemesterNotFound => "SEMESTER_NOT_FOUND",
            CourseError::PaymentNotFound => "PAYMENT_NOT_FOUND",
            CourseError::PaymentModeMismatch { .. } => "PAYMENT_MODE_MISMATCH",
            CourseError::Internal(_) => "INTERNAL",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, CourseError>;

#[derive(Debug, Clone, Deserialize)]
pub struct CourseCheckoutRequest {
    pub user_id: Uuid,
    pub enrollment_id: Uuid,
    pub mode: CoursePaymentMode,
    /// Installment the caller expects to pay; must be the next payable one when given.
    pub installment_index: Option<i32>,
    pub provider: PaymentProvider,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentDto {
    pub index: i32,
    pub amount: i64,
    pub status: String,
    pub due_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<CoursePaymentInstallmentEntity> for InstallmentDto {
    fn from(value: CoursePaymentInstallmentEntity) -> Self {
        Self {
            index: value.installment_index,
            amount: value.amount,
            status: value.status,
            due_at: value.due_at,
            paid_at: value.paid_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentPlanDto {
    pub enrollment_id: Uuid,
    pub base_amount: i64,
    pub discount_amount: i64,
    pub lumpsum_amount: i64,
    pub installments_total: i64,
    pub currency: String,
    pub installments: Vec<InstallmentDto>,
}

impl InstallmentPlanDto {
    fn from_entities(
        plan: CoursePaymentPlanEntity,
        installments: Vec<CoursePaymentInstallmentEntity>,
    ) -> Self {
        Self {
            enrollment_id: plan.enrollment_id,
            base_amount: plan.base_amount,
            discount_amount: plan.discount_amount,
            lumpsum_amount: plan.lumpsum_amount,
            installments_total: plan.installments_total,
            currency: plan.currency,
            installments: installments.into_iter().map(InstallmentDto::from).collect(),
        }
    }
}

fn installment_count(semester: &SemesterEntity) -> i32 {
    if semester.installments_enabled {
        semester.installment_count.max(1)
    } else {
        1
    }
}

/// Creates the enrollment's payment plan and installment rows once; later calls return the
/// stored plan untouched.
pub fn ensure_installment_plan<T: BillingTx>(
    tx: &mut T,
    enrollment: &EnrollmentEntity,
    semester: &SemesterEntity,
    now: DateTime<Utc>,
) -> anyhow::Result<CoursePaymentPlanEntity> {
    if let Some(plan) = tx.find_payment_plan(enrollment.id)? {
        return Ok(plan);
    }

    let count = installment_count(semester);
    let breakdown = PricingBreakdown::compute(
        semester.tuition_amount,
        semester.lumpsum_discount_percent,
        count,
    );

    let inserted = tx.insert_payment_plan(InsertCoursePaymentPlanEntity {
        enrollment_id: enrollment.id,
        semester_id: semester.id,
        base_amount: breakdown.base_amount,
        discount_amount: breakdown.discount_amount,
        lumpsum_amount: breakdown.lumpsum_amount,
        installments_total: breakdown.installments_total,
        installment_count: count,
        currency: semester.currency.clone(),
    })?;
    let plan = match inserted {
        Some(plan) => plan,
        None => {
            return tx
                .find_payment_plan(enrollment.id)?
                .context("payment plan vanished after insert conflict");
        }
    };

    let interval = i64::from(semester.installment_interval_days.max(0));
    let rows = (1_i32..)
        .zip(breakdown.installment_amounts.iter())
        .map(|(index, amount)| InsertCoursePaymentInstallmentEntity {
            plan_id: plan.id,
            enrollment_id: enrollment.id,
            installment_index: index,
            amount: *amount,
            status: InstallmentStatus::Due.to_string(),
            due_at: now + Duration::days(interval * i64::from(index - 1)),
        })
        .collect();
    let created = tx.insert_installments(rows)?;

    info!(
        enrollment_id = %enrollment.id,
        installments = created,
        lumpsum_amount = plan.lumpsum_amount,
        "courses: payment plan created"
    );

    Ok(plan)
}

/// Lowest-index installment that is still due or failed.
pub fn next_payable(
    installments: &[CoursePaymentInstallmentEntity],
) -> Option<&CoursePaymentInstallmentEntity> {
    installments
        .iter()
        .filter(|installment| {
            installment
                .status()
                .is_some_and(|status| status.is_payable())
        })
        .min_by_key(|installment| installment.installment_index)
}

fn load_enrollment_and_semester<T: BillingTx>(
    tx: &mut T,
    enrollment_id: Uuid,
) -> UseCaseResult<(EnrollmentEntity, SemesterEntity)> {
    let enrollment = tx
        .find_enrollment(enrollment_id)?
        .ok_or(CourseError::EnrollmentNotFound)?;
    let semester = tx
        .find_semester(enrollment.semester_id)?
        .ok_or(CourseError::SemesterNotFound)?;
    Ok((enrollment, semester))
}

/// Validates the enrollment and opens (or reuses) the checkout session for the requested
/// payment. Every user-facing refusal comes back as a rejection, not an error.
fn prepare_course_checkout<T: BillingTx>(
    tx: &mut T,
    request: &CourseCheckoutRequest,
    return_url: String,
    now: DateTime<Utc>,
) -> anyhow::Result<PreparedCheckout> {
    let reject = |reason| Ok(PreparedCheckout::Rejected(reason));

    let Some(enrollment) = tx
        .lock_enrollment(request.enrollment_id)?
        .filter(|enrollment| enrollment.user_id == request.user_id)
    else {
        return reject(CheckoutRejection::EnrollmentNotFound);
    };
    match enrollment.status() {
        Some(EnrollmentStatus::PendingPayment) => {}
        Some(EnrollmentStatus::Active) => return reject(CheckoutRejection::AlreadyPaid),
        Some(EnrollmentStatus::Canceled) | None => {
            return reject(CheckoutRejection::InvalidEnrollmentStatus);
        }
    }

    let semester = tx
        .find_semester(enrollment.semester_id)?
        .context("enrollment references a missing semester")?;
    let course = tx
        .find_course(semester.course_id)?
        .context("semester references a missing course")?;
    if !course.is_published {
        return reject(CheckoutRejection::CourseNotPublished);
    }
    if semester.status() != SemesterStatus::Open {
        return reject(CheckoutRejection::SemesterNotOpen);
    }
    if request.mode == CoursePaymentMode::Installments && !semester.installments_enabled {
        return reject(CheckoutRejection::InstallmentsDisabled);
    }

    let plan = ensure_installment_plan(tx, &enrollment, &semester, now)?;
    let installments = tx.list_installments(enrollment.id)?;
    let started_installments = installments
        .iter()
        .any(|installment| installment.status() == Some(InstallmentStatus::Paid));

    let (amount, installment_index, description) = match request.mode {
        CoursePaymentMode::Lumpsum => {
            if started_installments {
                return reject(CheckoutRejection::InvalidEnrollmentStatus);
            }
            (
                plan.lumpsum_amount,
                None,
                format!("{} / {} tuition", course.title, semester.title),
            )
        }
        CoursePaymentMode::Installments => {
            let Some(next) = next_payable(&installments) else {
                return reject(CheckoutRejection::AlreadyPaid);
            };
            if request
                .installment_index
                .is_some_and(|index| index != next.installment_index)
            {
                return reject(CheckoutRejection::InvalidInstallment);
            }
            (
                next.amount,
                Some(next.installment_index),
                format!(
                    "{} / {} installment {} of {}",
                    course.title, semester.title, next.installment_index, plan.installment_count
                ),
            )
        }
    };

    tx.set_enrollment_payment_mode(enrollment.id, request.mode, now)?;

    let (session, reused) = open_or_reuse_session(
        tx,
        InsertCheckoutSessionEntity {
            user_id: request.user_id,
            provider: request.provider.to_string(),
            price_id: None,
            purchase_type: PurchaseType::CourseSemester.to_string(),
            enrollment_id: Some(enrollment.id),
            installment_index,
            amount,
            currency: plan.currency.clone(),
            idempotency_key: course_checkout_idempotency_key(
                enrollment.id,
                request.mode,
                installment_index,
                amount,
            ),
            return_url,
        },
    )?;

    Ok(PreparedCheckout::Ready {
        session,
        reused,
        description,
    })
}

/// Applies a course payment outcome to the enrollment and its installments. Every write is
/// conditional, so a duplicate delivery reports `AlreadyApplied` and changes nothing.
pub fn apply_course_payment<T: BillingTx>(
    tx: &mut T,
    payment: &PaymentEntity,
    session: &CheckoutSessionEntity,
    outcome: PaymentOutcome,
    now: DateTime<Utc>,
) -> UseCaseResult<CourseApplyOutcome> {
    let enrollment_id = session.enrollment_id.ok_or(CourseError::EnrollmentNotFound)?;
    let enrollment = tx
        .lock_enrollment(enrollment_id)?
        .ok_or(CourseError::EnrollmentNotFound)?;

    let session_mode = match session.installment_index {
        Some(_) => CoursePaymentMode::Installments,
        None => CoursePaymentMode::Lumpsum,
    };
    if let Some(expected) = enrollment.payment_mode() {
        if expected != session_mode {
            return Err(CourseError::PaymentModeMismatch {
                expected,
                actual: session_mode,
            });
        }
    }

    let resource = payment_resource(payment.id);
    let applied = match (outcome, session.installment_index) {
        (PaymentOutcome::Failed, Some(index)) => {
            return Ok(if tx.mark_installment_failed(enrollment.id, index, now)? {
                info!(%enrollment_id, index, "courses: installment payment failed");
                CourseApplyOutcome::InstallmentFailed { index }
            } else {
                CourseApplyOutcome::Ignored
            });
        }
        (PaymentOutcome::Failed, None) => return Ok(CourseApplyOutcome::Ignored),
        (PaymentOutcome::Paid, None) => {
            if tx.activate_enrollment(enrollment.id, now)? {
                CourseApplyOutcome::EnrollmentActivated
            } else {
                CourseApplyOutcome::AlreadyApplied
            }
        }
        (PaymentOutcome::Paid, Some(index)) => {
            if !tx.mark_installment_paid(enrollment.id, index, payment.id, now)? {
                CourseApplyOutcome::AlreadyApplied
            } else {
                let remaining = tx.count_unpaid_installments(enrollment.id)?;
                if remaining == 0 && tx.activate_enrollment(enrollment.id, now)? {
                    CourseApplyOutcome::EnrollmentActivated
                } else {
                    CourseApplyOutcome::InstallmentPaid { index, remaining }
                }
            }
        }
    };

    if applied == CourseApplyOutcome::AlreadyApplied {
        tx.append_audit_log(
            InsertAuditLogEntity::new(WEBHOOK_ACTOR, AuditAction::DuplicateGuard, resource)
                .with_reason(AuditAction::CourseInstallmentApplied.as_str()),
        )?;
        if enrollment.status() == Some(EnrollmentStatus::Canceled) {
            warn!(%enrollment_id, payment_id = %payment.id, "courses: payment arrived for a canceled enrollment");
        }
        return Ok(applied);
    }

    tx.append_audit_log(
        InsertAuditLogEntity::new(
            WEBHOOK_ACTOR,
            AuditAction::CourseInstallmentApplied,
            resource,
        )
        .with_before(json!({ "enrollment_status": enrollment.status }))
        .with_after(json!({
            "installment_index": session.installment_index,
            "outcome": applied,
        })),
    )?;

    info!(%enrollment_id, payment_id = %payment.id, outcome = ?applied, "courses: payment applied");

    Ok(applied)
}

pub struct CourseInstallmentsUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
    registry: ProviderRegistry,
    settings: CheckoutSettings,
}

impl<S> CourseInstallmentsUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>, registry: ProviderRegistry, settings: CheckoutSettings) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Price preview for a semester without touching any enrollment.
    pub fn quote(&self, semester_id: Uuid) -> UseCaseResult<PricingBreakdown> {
        self.store.with_transaction(|tx| {
            let semester = tx
                .find_semester(semester_id)?
                .ok_or(CourseError::SemesterNotFound)?;
            Ok(PricingBreakdown::compute(
                semester.tuition_amount,
                semester.lumpsum_discount_percent,
                installment_count(&semester),
            ))
        })
    }

    pub fn ensure_installment_plan(
        &self,
        enrollment_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<InstallmentPlanDto> {
        self.store
            .with_transaction(|tx| {
                let (enrollment, semester) = load_enrollment_and_semester(tx, enrollment_id)?;
                let plan = ensure_installment_plan(tx, &enrollment, &semester, now)?;
                let installments = tx.list_installments(enrollment.id)?;
                Ok(InstallmentPlanDto::from_entities(plan, installments))
            })
            .inspect_err(|err| log_failure(enrollment_id, "ensure plan", err))
    }

    /// `None` once the enrollment is paid for, whichever mode it used.
    pub fn compute_next_installment_to_pay(
        &self,
        enrollment_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<Option<InstallmentDto>> {
        self.store
            .with_transaction(|tx| {
                let (enrollment, semester) = load_enrollment_and_semester(tx, enrollment_id)?;
                if enrollment.status() != Some(EnrollmentStatus::PendingPayment) {
                    return Ok(None);
                }
                ensure_installment_plan(tx, &enrollment, &semester, now)?;
                let installments = tx.list_installments(enrollment.id)?;
                Ok(next_payable(&installments).cloned().map(InstallmentDto::from))
            })
            .inspect_err(|err| log_failure(enrollment_id, "next installment", err))
    }

    pub async fn create_course_checkout_session(
        &self,
        request: CourseCheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if self.registry.get(request.provider).is_none() {
            warn!(provider = %request.provider, "courses: provider not configured");
            return Ok(CheckoutOutcome::rejected(CheckoutRejection::ProviderUnavailable));
        }

        let return_url = self.settings.return_url.clone();
        let prepared = self
            .store
            .with_transaction(|tx| prepare_course_checkout(tx, &request, return_url, now))
            .map_err(|err| {
                error!(
                    enrollment_id = %request.enrollment_id,
                    db_error = ?err,
                    "courses: failed to prepare checkout"
                );
                CheckoutError::Internal(err)
            })?;

        if let PreparedCheckout::Rejected(reason) = &prepared {
            info!(
                enrollment_id = %request.enrollment_id,
                reason = reason.code(),
                "courses: checkout rejected"
            );
        }

        issue_redirect(
            self.store.as_ref(),
            &self.registry,
            prepared,
            self.settings.provider_timeout,
        )
        .await
    }

    /// Re-applies a recorded course payment, for operators repairing a missed webhook.
    pub fn apply_course_payment_from_webhook(
        &self,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> UseCaseResult<CourseApplyOutcome> {
        self.store.with_transaction(|tx| {
            let payment = tx
                .lock_payment(payment_id)?
                .ok_or(CourseError::PaymentNotFound)?;
            let session = tx
                .find_checkout_session(payment.checkout_session_id)?
                .context("payment references a missing checkout session")?;
            let outcome = match payment.status() {
                Some(PaymentStatus::Paid) => PaymentOutcome::Paid,
                Some(PaymentStatus::Failed) => PaymentOutcome::Failed,
                _ => return Ok(CourseApplyOutcome::Ignored),
            };
            apply_course_payment(tx, &payment, &session, outcome, now)
        })
    }
}

fn log_failure(enrollment_id: Uuid, action: &str, err: &CourseError) {
    match err {
        CourseError::Internal(err) => {
            error!(%enrollment_id, action, db_error = ?err, "courses: operation failed");
        }
        other => {
            warn!(%enrollment_id, action, code = other.code(), "courses: operation rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::checkout::tests::{redirecting_adapter, settings};
    use billing_core::{
        domain::{
            entities::payments::InsertPaymentEntity,
            repositories::{
                checkout_sessions::CheckoutSessionRepository, payments::PaymentRepository,
            },
        },
        infra::memory::InMemoryBillingStore,
    };

    struct Fixture {
        store: Arc<InMemoryBillingStore>,
        usecase: CourseInstallmentsUseCase<InMemoryBillingStore>,
        user_id: Uuid,
        enrollment_id: Uuid,
    }

    fn fixture(tuition: i64, discount: i32, installments: i32, start_calls: usize) -> Fixture {
        let store = Arc::new(InMemoryBillingStore::new());
        let user_id = Uuid::new_v4();
        let enrollment_id = store.seed(|state| {
            let semester = state.seed_semester(tuition, discount, installments);
            state.seed_enrollment(user_id, semester.semester_id)
        });
        let registry = ProviderRegistry::new()
            .register(Arc::new(redirecting_adapter(PaymentProvider::Zarinpal, start_calls)));
        let usecase = CourseInstallmentsUseCase::new(Arc::clone(&store), registry, settings());
        Fixture {
            store,
            usecase,
            user_id,
            enrollment_id,
        }
    }

    fn request(fixture: &Fixture, mode: CoursePaymentMode, index: Option<i32>) -> CourseCheckoutRequest {
        CourseCheckoutRequest {
            user_id: fixture.user_id,
            enrollment_id: fixture.enrollment_id,
            mode,
            installment_index: index,
            provider: PaymentProvider::Zarinpal,
        }
    }

    fn session_of(outcome: &CheckoutOutcome) -> Uuid {
        match outcome {
            CheckoutOutcome::Redirect { session_id, .. } => *session_id,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    /// Records a payment for the session and applies it the way the webhook path does.
    fn settle(fixture: &Fixture, session_id: Uuid, outcome: PaymentOutcome) -> CourseApplyOutcome {
        fixture
            .store
            .with_transaction(|tx| {
                let session = tx.find_checkout_session(session_id)?.unwrap();
                let status = match outcome {
                    PaymentOutcome::Paid => PaymentStatus::Paid,
                    PaymentOutcome::Failed => PaymentStatus::Failed,
                };
                let payment = match tx.lock_payment_by_provider_ref(&session.provider, &session.provider_ref())? {
                    Some(payment) => payment,
                    None => tx
                        .insert_payment(InsertPaymentEntity {
                            user_id: session.user_id,
                            provider: session.provider.clone(),
                            provider_ref: session.provider_ref(),
                            provider_transaction_id: None,
                            checkout_session_id: session.id,
                            status: status.to_string(),
                            amount: session.amount,
                            currency: session.currency.clone(),
                            paid_at: None,
                        })?
                        .unwrap(),
                };
                apply_course_payment(tx, &payment, &session, outcome, Utc::now())
            })
            .unwrap()
    }

    #[tokio::test]
    async fn three_installments_activate_enrollment_only_after_the_last() {
        let fixture = fixture(3_000_000, 10, 3, 3);
        let now = Utc::now();

        let plan = fixture.usecase.ensure_installment_plan(fixture.enrollment_id, now).unwrap();
        assert_eq!(
            plan.installments.iter().map(|i| i.amount).collect::<Vec<_>>(),
            vec![1_000_000, 1_000_000, 1_000_000]
        );
        assert_eq!(plan.lumpsum_amount, 2_700_000);
        assert_eq!(plan.installments[1].due_at, now + Duration::days(30));

        let mut last_paid = 0;
        for expected_index in 1..=3 {
            let next = fixture
                .usecase
                .compute_next_installment_to_pay(fixture.enrollment_id, now)
                .unwrap()
                .unwrap();
            assert_eq!(next.index, expected_index);
            assert!(next.index > last_paid);

            let outcome = fixture
                .usecase
                .create_course_checkout_session(
                    request(&fixture, CoursePaymentMode::Installments, Some(expected_index)),
                    now,
                )
                .await
                .unwrap();
            let applied = settle(&fixture, session_of(&outcome), PaymentOutcome::Paid);
            last_paid = expected_index;

            let status = fixture.store.snapshot().enrollment(fixture.enrollment_id).unwrap().status();
            if expected_index < 3 {
                assert_eq!(
                    applied,
                    CourseApplyOutcome::InstallmentPaid {
                        index: expected_index,
                        remaining: i64::from(3 - expected_index)
                    }
                );
                assert_eq!(status, Some(EnrollmentStatus::PendingPayment));
            } else {
                assert_eq!(applied, CourseApplyOutcome::EnrollmentActivated);
                assert_eq!(status, Some(EnrollmentStatus::Active));
            }
        }

        assert_eq!(
            fixture
                .usecase
                .compute_next_installment_to_pay(fixture.enrollment_id, now)
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn duplicate_paid_delivery_is_already_applied() {
        let fixture = fixture(1_000_000, 0, 3, 1);
        let now = Utc::now();

        let outcome = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Installments, None), now)
            .await
            .unwrap();
        let session_id = session_of(&outcome);

        assert_eq!(
            settle(&fixture, session_id, PaymentOutcome::Paid),
            CourseApplyOutcome::InstallmentPaid { index: 1, remaining: 2 }
        );
        assert_eq!(
            settle(&fixture, session_id, PaymentOutcome::Paid),
            CourseApplyOutcome::AlreadyApplied
        );

        let state = fixture.store.snapshot();
        let paid = state
            .installments
            .iter()
            .filter(|i| i.status() == Some(InstallmentStatus::Paid))
            .count();
        assert_eq!(paid, 1);
        assert_eq!(state.installments[2].amount, 333_334);
    }

    #[tokio::test]
    async fn failed_installment_stays_next_and_paid_one_is_never_downgraded() {
        let fixture = fixture(900_000, 0, 3, 1);
        let now = Utc::now();

        let outcome = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Installments, Some(1)), now)
            .await
            .unwrap();
        let session_id = session_of(&outcome);

        assert_eq!(
            settle(&fixture, session_id, PaymentOutcome::Failed),
            CourseApplyOutcome::InstallmentFailed { index: 1 }
        );
        let next = fixture
            .usecase
            .compute_next_installment_to_pay(fixture.enrollment_id, now)
            .unwrap()
            .unwrap();
        assert_eq!(next.index, 1);
        assert_eq!(next.status, InstallmentStatus::Failed.as_str());

        settle(&fixture, session_id, PaymentOutcome::Paid);
        assert_eq!(
            settle(&fixture, session_id, PaymentOutcome::Failed),
            CourseApplyOutcome::Ignored
        );
        let next = fixture
            .usecase
            .compute_next_installment_to_pay(fixture.enrollment_id, now)
            .unwrap()
            .unwrap();
        assert_eq!(next.index, 2);
    }

    #[tokio::test]
    async fn retry_after_failed_installment_starts_a_new_provider_session() {
        let fixture = fixture(900_000, 0, 3, 2);
        let now = Utc::now();

        let first = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Installments, Some(1)), now)
            .await
            .unwrap();
        let failed_id = session_of(&first);
        assert_eq!(
            settle(&fixture, failed_id, PaymentOutcome::Failed),
            CourseApplyOutcome::InstallmentFailed { index: 1 }
        );

        let retry = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Installments, Some(1)), now)
            .await
            .unwrap();
        let CheckoutOutcome::Redirect {
            session_id,
            redirect_url,
            reused,
        } = retry
        else {
            panic!("expected a redirect, got {retry:?}");
        };
        assert_ne!(session_id, failed_id);
        assert!(!reused);
        assert_eq!(redirect_url, format!("https://pay.test/start/{session_id}"));

        // A repeated click on the retry lands on the retry session, not a third one.
        let again = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Installments, Some(1)), now)
            .await
            .unwrap();
        assert_eq!(session_of(&again), session_id);

        assert_eq!(
            settle(&fixture, session_id, PaymentOutcome::Paid),
            CourseApplyOutcome::InstallmentPaid { index: 1, remaining: 2 }
        );
        assert_eq!(fixture.store.snapshot().checkout_sessions.len(), 2);
    }

    #[tokio::test]
    async fn failed_lumpsum_can_be_paid_on_retry() {
        let fixture = fixture(2_000_000, 15, 4, 2);
        let now = Utc::now();

        let first = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Lumpsum, None), now)
            .await
            .unwrap();
        let failed_id = session_of(&first);
        assert_eq!(
            settle(&fixture, failed_id, PaymentOutcome::Failed),
            CourseApplyOutcome::Ignored
        );

        let retry = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Lumpsum, None), now)
            .await
            .unwrap();
        let retry_id = session_of(&retry);
        assert_ne!(retry_id, failed_id);

        assert_eq!(
            settle(&fixture, retry_id, PaymentOutcome::Paid),
            CourseApplyOutcome::EnrollmentActivated
        );
    }

    #[tokio::test]
    async fn lumpsum_pays_discounted_amount_and_activates() {
        let fixture = fixture(2_000_000, 15, 4, 1);
        let now = Utc::now();

        let outcome = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Lumpsum, None), now)
            .await
            .unwrap();
        let session_id = session_of(&outcome);

        let session = fixture
            .store
            .snapshot()
            .checkout_sessions
            .into_iter()
            .find(|s| s.id == session_id)
            .unwrap();
        assert_eq!(session.amount, 1_700_000);

        assert_eq!(
            settle(&fixture, session_id, PaymentOutcome::Paid),
            CourseApplyOutcome::EnrollmentActivated
        );

        let again = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Lumpsum, None), now)
            .await
            .unwrap();
        assert_eq!(again, CheckoutOutcome::rejected(CheckoutRejection::AlreadyPaid));
    }

    #[tokio::test]
    async fn checkout_rejections_are_returned_as_data() {
        let fixture = fixture(1_000_000, 0, 1, 0);
        let now = Utc::now();

        let disabled = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Installments, None), now)
            .await
            .unwrap();
        assert_eq!(disabled, CheckoutOutcome::rejected(CheckoutRejection::InstallmentsDisabled));

        let mut stranger = request(&fixture, CoursePaymentMode::Lumpsum, None);
        stranger.user_id = Uuid::new_v4();
        let not_found = fixture
            .usecase
            .create_course_checkout_session(stranger, now)
            .await
            .unwrap();
        assert_eq!(not_found, CheckoutOutcome::rejected(CheckoutRejection::EnrollmentNotFound));

        fixture.store.seed(|state| state.semesters[0].status = SemesterStatus::Closed.to_string());
        let closed = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Lumpsum, None), now)
            .await
            .unwrap();
        assert_eq!(closed, CheckoutOutcome::rejected(CheckoutRejection::SemesterNotOpen));

        fixture.store.seed(|state| state.courses[0].is_published = false);
        let unpublished = fixture
            .usecase
            .create_course_checkout_session(request(&fixture, CoursePaymentMode::Lumpsum, None), now)
            .await
            .unwrap();
        assert_eq!(unpublished, CheckoutOutcome::rejected(CheckoutRejection::CourseNotPublished));
    }

    #[tokio::test]
    async fn skipping_ahead_is_an_invalid_installment() {
        let fixture = fixture(1_200_000, 0, 3, 0);

        let outcome = fixture
            .usecase
            .create_course_checkout_session(
                request(&fixture, CoursePaymentMode::Installments, Some(2)),
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::rejected(CheckoutRejection::InvalidInstallment));
    }

    #[test]
    fn quote_previews_pricing() {
        let store = Arc::new(InMemoryBillingStore::new());
        let semester = store.seed(|state| state.seed_semester(1_000_000, 20, 3));
        let usecase = CourseInstallmentsUseCase::new(
            Arc::clone(&store),
            ProviderRegistry::new(),
            settings(),
        );

        let quote = usecase.quote(semester.semester_id).unwrap();

        assert_eq!(quote.lumpsum_amount, 800_000);
        assert_eq!(quote.installment_amounts, vec![333_333, 333_333, 333_334]);
    }
}
