//! Transactional in-memory billing store for tests.
//!
//! Each transaction works on a copy of the state and commits only when the closure returns
//! `Ok`, so rollback behaves like the Postgres store. The store lock is held for the whole
//! transaction, which serializes writers the way row locks do. Unique constraints from the
//! SQL schema are enforced by the insert methods.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Mutex};
use uuid::Uuid;

use crate::domain::{
    entities::{
        audit_logs::{AuditLogEntity, InsertAuditLogEntity},
        checkout_sessions::{CheckoutSessionEntity, InsertCheckoutSessionEntity},
        course_payments::{
            CoursePaymentInstallmentEntity, CoursePaymentPlanEntity,
            InsertCoursePaymentInstallmentEntity, InsertCoursePaymentPlanEntity,
        },
        courses::{CourseEntity, EnrollmentEntity, SemesterEntity},
        invoices::{InsertInvoiceEntity, InvoiceEntity},
        job_credit_grants::{InsertJobCreditGrantEntity, JobCreditGrantEntity},
        payment_webhook_logs::{InsertPaymentWebhookLogEntity, PaymentWebhookLogEntity},
        payments::{InsertPaymentEntity, PaymentEntity, PaymentOutcomeChangeset},
        plans::PlanEntity,
        prices::PriceEntity,
        products::ProductEntity,
        subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        user_entitlements::{InsertUserEntitlementEntity, UserEntitlementEntity},
    },
    repositories::{
        audit_logs::AuditLogRepository, catalog::CatalogRepository,
        checkout_sessions::CheckoutSessionRepository, courses::CourseRepository,
        entitlements::EntitlementRepository, invoices::InvoiceRepository,
        job_credit_grants::JobCreditGrantRepository, payments::PaymentRepository,
        profiles::ProfileVisibilityRepository, subscriptions::SubscriptionRepository,
        transaction::TransactionManager, webhook_logs::WebhookLogRepository,
    },
    value_objects::{
        enums::{
            audit_actions::AuditAction,
            course_statuses::{
                CoursePaymentMode, EnrollmentStatus, InstallmentStatus, SemesterStatus,
            },
            entitlement_keys::EntitlementKey,
            invoice_statuses::InvoiceStatus,
            plan_cycles::PlanCycle,
            purchase_types::ProductType,
            subscription_statuses::SubscriptionStatus,
            webhook_log_statuses::WebhookLogStatus,
        },
        plans::{PlanLimits, PriceMetadata},
    },
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    pub webhook_logs: Vec<PaymentWebhookLogEntity>,
    pub checkout_sessions: Vec<CheckoutSessionEntity>,
    pub products: Vec<ProductEntity>,
    pub plans: Vec<PlanEntity>,
    pub prices: Vec<PriceEntity>,
    pub payments: Vec<PaymentEntity>,
    pub invoices: Vec<InvoiceEntity>,
    pub subscriptions: Vec<SubscriptionEntity>,
    pub entitlements: Vec<UserEntitlementEntity>,
    pub job_credit_grants: Vec<JobCreditGrantEntity>,
    pub courses: Vec<CourseEntity>,
    pub semesters: Vec<SemesterEntity>,
    pub enrollments: Vec<EnrollmentEntity>,
    pub payment_plans: Vec<CoursePaymentPlanEntity>,
    pub installments: Vec<CoursePaymentInstallmentEntity>,
    pub audit_logs: Vec<AuditLogEntity>,
    /// user_id -> is_published
    pub profiles: HashMap<Uuid, bool>,
    /// The next this-many subscription locks miss, as if they ran before a concurrent
    /// transaction committed its insert.
    pub uncommitted_subscription_reads: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SeededPrice {
    pub product_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub price_id: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct SeededSemester {
    pub course_id: Uuid,
    pub semester_id: Uuid,
}

impl InMemoryState {
    pub fn seed_subscription_price(&mut self, cycle: PlanCycle, amount: i64) -> SeededPrice {
        let product_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let price_id = Uuid::new_v4();

        self.products.push(ProductEntity {
            id: product_id,
            name: format!("{cycle} membership"),
            product_type: ProductType::Subscription.to_string(),
            is_active: true,
        });
        self.plans.push(PlanEntity {
            id: plan_id,
            product_id,
            name: format!("{cycle} plan"),
            cycle,
            limits: PlanLimits::default(),
            is_active: true,
        });
        self.prices.push(PriceEntity {
            id: price_id,
            product_id,
            plan_id: Some(plan_id),
            amount,
            currency: "IRR".to_string(),
            metadata: PriceMetadata::default(),
            is_active: true,
        });

        SeededPrice {
            product_id,
            plan_id: Some(plan_id),
            price_id,
        }
    }

    pub fn seed_job_credit_price(&mut self, amount: i64, credits: i32) -> SeededPrice {
        let product_id = Uuid::new_v4();
        let price_id = Uuid::new_v4();

        self.products.push(ProductEntity {
            id: product_id,
            name: "Job post pack".to_string(),
            product_type: ProductType::JobCredit.to_string(),
            is_active: true,
        });
        self.prices.push(PriceEntity {
            id: price_id,
            product_id,
            plan_id: None,
            amount,
            currency: "IRR".to_string(),
            metadata: PriceMetadata {
                job_post_credits: Some(credits),
                label: None,
            },
            is_active: true,
        });

        SeededPrice {
            product_id,
            plan_id: None,
            price_id,
        }
    }

    pub fn seed_semester(
        &mut self,
        tuition_amount: i64,
        lumpsum_discount_percent: i32,
        installment_count: i32,
    ) -> SeededSemester {
        let course_id = Uuid::new_v4();
        let semester_id = Uuid::new_v4();

        self.courses.push(CourseEntity {
            id: course_id,
            title: "Acting fundamentals".to_string(),
            is_published: true,
        });
        self.semesters.push(SemesterEntity {
            id: semester_id,
            course_id,
            title: "Spring".to_string(),
            status: SemesterStatus::Open.to_string(),
            tuition_amount,
            currency: "IRR".to_string(),
            lumpsum_discount_percent,
            installments_enabled: installment_count > 1,
            installment_count,
            installment_interval_days: 30,
        });

        SeededSemester {
            course_id,
            semester_id,
        }
    }

    pub fn seed_enrollment(&mut self, user_id: Uuid, semester_id: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.enrollments.push(EnrollmentEntity {
            id,
            user_id,
            semester_id,
            status: EnrollmentStatus::PendingPayment.to_string(),
            payment_mode: None,
            activated_at: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    pub fn seed_profile(&mut self, user_id: Uuid, is_published: bool) {
        self.profiles.insert(user_id, is_published);
    }

    pub fn subscription_of(&self, user_id: Uuid) -> Option<&SubscriptionEntity> {
        self.subscriptions.iter().find(|s| s.user_id == user_id)
    }

    pub fn entitlements_of(&self, user_id: Uuid, key: EntitlementKey) -> Vec<&UserEntitlementEntity> {
        self.entitlements
            .iter()
            .filter(|e| e.user_id == user_id && e.entitlement_key == key.as_str())
            .collect()
    }

    pub fn enrollment(&self, enrollment_id: Uuid) -> Option<&EnrollmentEntity> {
        self.enrollments.iter().find(|e| e.id == enrollment_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed<T>(&self, f: impl FnOnce(&mut InMemoryState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn snapshot(&self) -> InMemoryState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl TransactionManager for InMemoryBillingStore {
    type Tx = InMemoryState;

    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| E::from(anyhow!("in-memory billing store is poisoned")))?;
        let mut working = guard.clone();
        let output = f(&mut working)?;
        *guard = working;
        Ok(output)
    }
}

impl WebhookLogRepository for InMemoryState {
    fn insert_webhook_log(
        &mut self,
        log: InsertPaymentWebhookLogEntity,
    ) -> Result<Option<PaymentWebhookLogEntity>> {
        if self
            .webhook_logs
            .iter()
            .any(|l| l.provider == log.provider && l.external_id == log.external_id)
        {
            return Ok(None);
        }

        let entity = PaymentWebhookLogEntity {
            id: Uuid::new_v4(),
            provider: log.provider,
            external_id: log.external_id,
            payload: log.payload,
            status: log.status,
            error: log.error,
            received_at: Utc::now(),
            processed_at: None,
        };
        self.webhook_logs.push(entity.clone());
        Ok(Some(entity))
    }

    fn find_webhook_log(
        &mut self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<PaymentWebhookLogEntity>> {
        Ok(self
            .webhook_logs
            .iter()
            .find(|l| l.provider == provider && l.external_id == external_id)
            .cloned())
    }

    fn reclaim_webhook_log(
        &mut self,
        log_id: Uuid,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.webhook_logs.iter_mut().find(|l| {
            l.id == log_id
                && (l.status() == Some(WebhookLogStatus::Failed)
                    || (l.status() == Some(WebhookLogStatus::Received) && l.received_at < stale_before))
        }) {
            Some(log) => {
                log.status = WebhookLogStatus::Received.to_string();
                log.received_at = now;
                log.error = None;
                log.processed_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn finish_webhook_log(
        &mut self,
        log_id: Uuid,
        status: WebhookLogStatus,
        error: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(log) = self.webhook_logs.iter_mut().find(|l| l.id == log_id) {
            log.status = status.to_string();
            log.error = error;
            log.processed_at = Some(processed_at);
        }
        Ok(())
    }
}

impl CheckoutSessionRepository for InMemoryState {
    fn find_checkout_session(&mut self, session_id: Uuid) -> Result<Option<CheckoutSessionEntity>> {
        Ok(self
            .checkout_sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned())
    }

    fn find_checkout_session_by_idempotency_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<CheckoutSessionEntity>> {
        Ok(self
            .checkout_sessions
            .iter()
            .find(|s| s.idempotency_key == idempotency_key)
            .cloned())
    }

    fn insert_checkout_session(
        &mut self,
        session: InsertCheckoutSessionEntity,
    ) -> Result<Option<CheckoutSessionEntity>> {
        if self
            .checkout_sessions
            .iter()
            .any(|s| s.idempotency_key == session.idempotency_key)
        {
            return Ok(None);
        }

        let entity = CheckoutSessionEntity {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            provider: session.provider,
            price_id: session.price_id,
            purchase_type: session.purchase_type,
            enrollment_id: session.enrollment_id,
            installment_index: session.installment_index,
            amount: session.amount,
            currency: session.currency,
            idempotency_key: session.idempotency_key,
            redirect_url: None,
            return_url: session.return_url,
            created_at: Utc::now(),
        };
        self.checkout_sessions.push(entity.clone());
        Ok(Some(entity))
    }

    fn set_checkout_redirect_url(
        &mut self,
        session_id: Uuid,
        redirect_url: &str,
    ) -> Result<CheckoutSessionEntity> {
        let session = self
            .checkout_sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .context("checkout session not found")?;
        if session.redirect_url.is_none() {
            session.redirect_url = Some(redirect_url.to_string());
        }
        Ok(session.clone())
    }
}

impl CatalogRepository for InMemoryState {
    fn find_price(&mut self, price_id: Uuid) -> Result<Option<PriceEntity>> {
        Ok(self.prices.iter().find(|p| p.id == price_id).cloned())
    }

    fn find_plan(&mut self, plan_id: Uuid) -> Result<Option<PlanEntity>> {
        Ok(self.plans.iter().find(|p| p.id == plan_id).cloned())
    }

    fn find_product(&mut self, product_id: Uuid) -> Result<Option<ProductEntity>> {
        Ok(self.products.iter().find(|p| p.id == product_id).cloned())
    }
}

impl PaymentRepository for InMemoryState {
    fn find_payment(&mut self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        Ok(self.payments.iter().find(|p| p.id == payment_id).cloned())
    }

    fn lock_payment(&mut self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        self.find_payment(payment_id)
    }

    fn lock_payment_by_provider_ref(
        &mut self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentEntity>> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.provider == provider && p.provider_ref == provider_ref)
            .cloned())
    }

    fn insert_payment(&mut self, payment: InsertPaymentEntity) -> Result<Option<PaymentEntity>> {
        if self
            .payments
            .iter()
            .any(|p| p.provider == payment.provider && p.provider_ref == payment.provider_ref)
        {
            return Ok(None);
        }

        let now = Utc::now();
        let entity = PaymentEntity {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            provider: payment.provider,
            provider_ref: payment.provider_ref,
            provider_transaction_id: payment.provider_transaction_id,
            checkout_session_id: payment.checkout_session_id,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            paid_at: payment.paid_at,
            created_at: now,
            updated_at: now,
        };
        self.payments.push(entity.clone());
        Ok(Some(entity))
    }

    fn update_payment_outcome(
        &mut self,
        payment_id: Uuid,
        changes: PaymentOutcomeChangeset,
    ) -> Result<PaymentEntity> {
        let payment = self
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .context("payment not found")?;

        payment.status = changes.status;
        // Mirrors diesel's AsChangeset: a `None` leaves the column untouched.
        if changes.provider_transaction_id.is_some() {
            payment.provider_transaction_id = changes.provider_transaction_id;
        }
        payment.amount = changes.amount;
        if changes.paid_at.is_some() {
            payment.paid_at = changes.paid_at;
        }
        payment.updated_at = changes.updated_at;

        Ok(payment.clone())
    }
}

impl InvoiceRepository for InMemoryState {
    fn insert_invoice(&mut self, invoice: InsertInvoiceEntity) -> Result<Option<InvoiceEntity>> {
        if self.invoices.iter().any(|i| i.payment_id == invoice.payment_id) {
            return Ok(None);
        }

        let entity = InvoiceEntity {
            id: Uuid::new_v4(),
            payment_id: invoice.payment_id,
            user_id: invoice.user_id,
            invoice_type: invoice.invoice_type,
            status: invoice.status,
            total: invoice.total,
            currency: invoice.currency,
            issued_at: invoice.issued_at,
            updated_at: invoice.issued_at,
        };
        self.invoices.push(entity.clone());
        Ok(Some(entity))
    }

    fn find_invoice_by_payment(&mut self, payment_id: Uuid) -> Result<Option<InvoiceEntity>> {
        Ok(self
            .invoices
            .iter()
            .find(|i| i.payment_id == payment_id)
            .cloned())
    }

    fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<InvoiceEntity>> {
        Ok(self.invoices.iter().find(|i| i.id == invoice_id).cloned())
    }

    fn update_invoice_status(
        &mut self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<InvoiceEntity> {
        let invoice = self
            .invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
            .context("invoice not found")?;
        invoice.status = status.to_string();
        invoice.updated_at = updated_at;
        Ok(invoice.clone())
    }
}

impl SubscriptionRepository for InMemoryState {
    fn find_subscription_by_user(&mut self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        Ok(self.subscription_of(user_id).cloned())
    }

    fn lock_subscription_by_user(&mut self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        if self.uncommitted_subscription_reads > 0 {
            self.uncommitted_subscription_reads -= 1;
            return Ok(None);
        }
        self.find_subscription_by_user(user_id)
    }

    fn insert_subscription(
        &mut self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>> {
        if self
            .subscriptions
            .iter()
            .any(|s| s.user_id == subscription.user_id)
        {
            return Ok(None);
        }

        let now = Utc::now();
        let entity = SubscriptionEntity {
            id: Uuid::new_v4(),
            user_id: subscription.user_id,
            plan_id: subscription.plan_id,
            status: subscription.status,
            started_at: subscription.started_at,
            ends_at: subscription.ends_at,
            renewal_at: subscription.renewal_at,
            cancel_at_period_end: subscription.cancel_at_period_end,
            canceled_at: None,
            provider_ref: subscription.provider_ref,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions.push(entity.clone());
        Ok(Some(entity))
    }

    fn save_subscription(&mut self, subscription: &SubscriptionEntity) -> Result<SubscriptionEntity> {
        let stored = self
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .context("subscription not found")?;
        *stored = subscription.clone();
        Ok(stored.clone())
    }

    fn expire_lapsed_subscriptions(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let mut expired = 0;
        for subscription in self
            .subscriptions
            .iter_mut()
            .filter(|s| s.ends_at < now && s.status() != SubscriptionStatus::Expired)
        {
            subscription.status = SubscriptionStatus::Expired.to_string();
            subscription.updated_at = now;
            expired += 1;
        }
        Ok(expired)
    }

    fn list_reconcilable_user_ids(&mut self, key: EntitlementKey) -> Result<Vec<Uuid>> {
        let mut user_ids: Vec<Uuid> = self
            .subscriptions
            .iter()
            .map(|s| s.user_id)
            .chain(
                self.entitlements
                    .iter()
                    .filter(|e| e.entitlement_key == key.as_str())
                    .map(|e| e.user_id),
            )
            .collect();
        user_ids.sort();
        user_ids.dedup();
        Ok(user_ids)
    }
}

impl EntitlementRepository for InMemoryState {
    fn latest_entitlement(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
    ) -> Result<Option<UserEntitlementEntity>> {
        // `None` sorts above every timestamp, matching Postgres DESC ordering.
        Ok(self
            .entitlements
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.entitlement_key == key.as_str()
                    && e.remaining_credits.is_none()
            })
            .max_by_key(|e| e.expires_at.map_or((1, None), |at| (0, Some(at))))
            .cloned())
    }

    fn insert_entitlement(
        &mut self,
        entitlement: InsertUserEntitlementEntity,
    ) -> Result<UserEntitlementEntity> {
        let now = Utc::now();
        let entity = UserEntitlementEntity {
            id: Uuid::new_v4(),
            user_id: entitlement.user_id,
            entitlement_key: entitlement.entitlement_key,
            expires_at: entitlement.expires_at,
            remaining_credits: entitlement.remaining_credits,
            source_payment_id: entitlement.source_payment_id,
            created_at: now,
            updated_at: now,
        };
        self.entitlements.push(entity.clone());
        Ok(entity)
    }

    fn set_entitlement_expiry(
        &mut self,
        entitlement_id: Uuid,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(entitlement) = self
            .entitlements
            .iter_mut()
            .find(|e| e.id == entitlement_id)
        {
            entitlement.expires_at = Some(expires_at);
            entitlement.updated_at = updated_at;
        }
        Ok(())
    }

    fn add_entitlement_credits(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
        credits: i32,
        source_payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i32> {
        let existing = self.entitlements.iter_mut().find(|e| {
            e.user_id == user_id
                && e.entitlement_key == key.as_str()
                && e.remaining_credits.is_some()
        });

        match existing {
            Some(entitlement) => {
                let balance = entitlement.remaining_credits.unwrap_or(0) + credits;
                entitlement.remaining_credits = Some(balance);
                entitlement.source_payment_id = Some(source_payment_id);
                entitlement.updated_at = now;
                Ok(balance)
            }
            None => {
                self.insert_entitlement(InsertUserEntitlementEntity {
                    user_id,
                    entitlement_key: key.to_string(),
                    expires_at: None,
                    remaining_credits: Some(credits),
                    source_payment_id: Some(source_payment_id),
                })?;
                Ok(credits)
            }
        }
    }

    fn take_entitlement_credit(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>> {
        let Some(entitlement) = self.entitlements.iter_mut().find(|e| {
            e.user_id == user_id
                && e.entitlement_key == key.as_str()
                && e.remaining_credits.is_some_and(|c| c > 0)
        }) else {
            return Ok(None);
        };

        let balance = entitlement.remaining_credits.unwrap_or(0) - 1;
        entitlement.remaining_credits = Some(balance);
        entitlement.updated_at = now;
        Ok(Some(balance))
    }

    fn credit_balance(&mut self, user_id: Uuid, key: EntitlementKey) -> Result<i32> {
        Ok(self
            .entitlements
            .iter()
            .filter(|e| e.user_id == user_id && e.entitlement_key == key.as_str())
            .find_map(|e| e.remaining_credits)
            .unwrap_or(0))
    }
}

impl JobCreditGrantRepository for InMemoryState {
    fn insert_job_credit_grant(
        &mut self,
        grant: InsertJobCreditGrantEntity,
    ) -> Result<Option<JobCreditGrantEntity>> {
        if self
            .job_credit_grants
            .iter()
            .any(|g| g.payment_id == grant.payment_id)
        {
            return Ok(None);
        }

        let entity = JobCreditGrantEntity {
            id: Uuid::new_v4(),
            payment_id: grant.payment_id,
            user_id: grant.user_id,
            credits: grant.credits,
            created_at: Utc::now(),
        };
        self.job_credit_grants.push(entity.clone());
        Ok(Some(entity))
    }
}

impl CourseRepository for InMemoryState {
    fn find_course(&mut self, course_id: Uuid) -> Result<Option<CourseEntity>> {
        Ok(self.courses.iter().find(|c| c.id == course_id).cloned())
    }

    fn find_semester(&mut self, semester_id: Uuid) -> Result<Option<SemesterEntity>> {
        Ok(self.semesters.iter().find(|s| s.id == semester_id).cloned())
    }

    fn find_enrollment(&mut self, enrollment_id: Uuid) -> Result<Option<EnrollmentEntity>> {
        Ok(self.enrollment(enrollment_id).cloned())
    }

    fn lock_enrollment(&mut self, enrollment_id: Uuid) -> Result<Option<EnrollmentEntity>> {
        self.find_enrollment(enrollment_id)
    }

    fn set_enrollment_payment_mode(
        &mut self,
        enrollment_id: Uuid,
        mode: CoursePaymentMode,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.enrollments.iter_mut().find(|e| {
            e.id == enrollment_id && e.status == EnrollmentStatus::PendingPayment.as_str()
        }) {
            Some(enrollment) => {
                enrollment.payment_mode = Some(mode.to_string());
                enrollment.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn activate_enrollment(&mut self, enrollment_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        match self.enrollments.iter_mut().find(|e| {
            e.id == enrollment_id && e.status == EnrollmentStatus::PendingPayment.as_str()
        }) {
            Some(enrollment) => {
                enrollment.status = EnrollmentStatus::Active.to_string();
                enrollment.activated_at = Some(now);
                enrollment.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_payment_plan(&mut self, enrollment_id: Uuid) -> Result<Option<CoursePaymentPlanEntity>> {
        Ok(self
            .payment_plans
            .iter()
            .find(|p| p.enrollment_id == enrollment_id)
            .cloned())
    }

    fn insert_payment_plan(
        &mut self,
        plan: InsertCoursePaymentPlanEntity,
    ) -> Result<Option<CoursePaymentPlanEntity>> {
        if self
            .payment_plans
            .iter()
            .any(|p| p.enrollment_id == plan.enrollment_id)
        {
            return Ok(None);
        }

        let entity = CoursePaymentPlanEntity {
            id: Uuid::new_v4(),
            enrollment_id: plan.enrollment_id,
            semester_id: plan.semester_id,
            base_amount: plan.base_amount,
            discount_amount: plan.discount_amount,
            lumpsum_amount: plan.lumpsum_amount,
            installments_total: plan.installments_total,
            installment_count: plan.installment_count,
            currency: plan.currency,
            created_at: Utc::now(),
        };
        self.payment_plans.push(entity.clone());
        Ok(Some(entity))
    }

    fn insert_installments(
        &mut self,
        installments: Vec<InsertCoursePaymentInstallmentEntity>,
    ) -> Result<u64> {
        let mut inserted = 0;
        for installment in installments {
            if self.installments.iter().any(|i| {
                i.enrollment_id == installment.enrollment_id
                    && i.installment_index == installment.installment_index
            }) {
                continue;
            }

            self.installments.push(CoursePaymentInstallmentEntity {
                id: Uuid::new_v4(),
                plan_id: installment.plan_id,
                enrollment_id: installment.enrollment_id,
                installment_index: installment.installment_index,
                amount: installment.amount,
                status: installment.status,
                due_at: installment.due_at,
                paid_payment_id: None,
                paid_at: None,
                updated_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    fn list_installments(
        &mut self,
        enrollment_id: Uuid,
    ) -> Result<Vec<CoursePaymentInstallmentEntity>> {
        let mut installments: Vec<_> = self
            .installments
            .iter()
            .filter(|i| i.enrollment_id == enrollment_id)
            .cloned()
            .collect();
        installments.sort_by_key(|i| i.installment_index);
        Ok(installments)
    }

    fn mark_installment_paid(
        &mut self,
        enrollment_id: Uuid,
        installment_index: i32,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.installments.iter_mut().find(|i| {
            i.enrollment_id == enrollment_id
                && i.installment_index == installment_index
                && i.status != InstallmentStatus::Paid.as_str()
        }) {
            Some(installment) => {
                installment.status = InstallmentStatus::Paid.to_string();
                installment.paid_payment_id = Some(payment_id);
                installment.paid_at = Some(now);
                installment.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_installment_failed(
        &mut self,
        enrollment_id: Uuid,
        installment_index: i32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match self.installments.iter_mut().find(|i| {
            i.enrollment_id == enrollment_id
                && i.installment_index == installment_index
                && i.status == InstallmentStatus::Due.as_str()
        }) {
            Some(installment) => {
                installment.status = InstallmentStatus::Failed.to_string();
                installment.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count_unpaid_installments(&mut self, enrollment_id: Uuid) -> Result<i64> {
        Ok(self
            .installments
            .iter()
            .filter(|i| {
                i.enrollment_id == enrollment_id && i.status != InstallmentStatus::Paid.as_str()
            })
            .count() as i64)
    }
}

impl AuditLogRepository for InMemoryState {
    fn append_audit_log(&mut self, record: InsertAuditLogEntity) -> Result<()> {
        self.audit_logs.push(AuditLogEntity {
            id: Uuid::new_v4(),
            actor: record.actor,
            action: record.action,
            reason: record.reason,
            resource: record.resource,
            before: record.before,
            after: record.after,
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn has_audit_marker(&mut self, resource: &str, action: AuditAction) -> Result<bool> {
        Ok(self
            .audit_logs
            .iter()
            .any(|a| a.resource == resource && a.action == action.as_str()))
    }
}

impl ProfileVisibilityRepository for InMemoryState {
    fn auto_unpublish_if_no_entitlement(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let still_entitled = self.entitlements.iter().any(|e| {
            e.user_id == user_id
                && e.entitlement_key == EntitlementKey::CanPublishProfile.as_str()
                && e.is_active(now)
        });
        if still_entitled {
            return Ok(false);
        }

        match self.profiles.get_mut(&user_id) {
            Some(is_published) if *is_published => {
                *is_published = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
