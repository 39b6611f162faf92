use super::{
    audit_logs::AuditLogRepository, catalog::CatalogRepository,
    checkout_sessions::CheckoutSessionRepository, courses::CourseRepository,
    entitlements::EntitlementRepository, invoices::InvoiceRepository,
    job_credit_grants::JobCreditGrantRepository, payments::PaymentRepository,
    profiles::ProfileVisibilityRepository, subscriptions::SubscriptionRepository,
    webhook_logs::WebhookLogRepository,
};

/// Everything a billing operation may touch inside one transaction.
pub trait BillingTx:
    WebhookLogRepository
    + CheckoutSessionRepository
    + CatalogRepository
    + PaymentRepository
    + InvoiceRepository
    + SubscriptionRepository
    + EntitlementRepository
    + JobCreditGrantRepository
    + CourseRepository
    + AuditLogRepository
    + ProfileVisibilityRepository
{
}

impl<T> BillingTx for T where
    T: WebhookLogRepository
        + CheckoutSessionRepository
        + CatalogRepository
        + PaymentRepository
        + InvoiceRepository
        + SubscriptionRepository
        + EntitlementRepository
        + JobCreditGrantRepository
        + CourseRepository
        + AuditLogRepository
        + ProfileVisibilityRepository
{
}

/// Runs a closure inside one database transaction: committed when it returns `Ok`,
/// rolled back on any `Err`.
pub trait TransactionManager: Send + Sync + 'static {
    type Tx: BillingTx;

    fn with_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<T, E>,
        E: From<anyhow::Error>;
}
