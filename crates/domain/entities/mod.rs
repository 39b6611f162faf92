pub mod audit_logs;
pub mod checkout_sessions;
pub mod course_payments;
pub mod courses;
pub mod invoices;
pub mod job_credit_grants;
pub mod payment_webhook_logs;
pub mod payments;
pub mod plans;
pub mod prices;
pub mod products;
pub mod subscriptions;
pub mod user_entitlements;
