pub mod audit_logs;
pub mod catalog;
pub mod checkout_sessions;
pub mod courses;
pub mod entitlements;
pub mod invoices;
pub mod job_credit_grants;
pub mod payments;
pub mod profiles;
pub mod subscriptions;
pub mod transaction;
pub mod webhook_logs;

pub use transaction::{BillingTx, TransactionManager};
