pub mod billing_dispatch;
pub mod checkout;
pub mod course_installments;
pub mod entitlement_sync;
pub mod job_credits;
pub mod payment_recorder;
pub mod subscription_lifecycle;
pub mod webhook_ingestion;
