pub mod audit_actions;
pub mod course_statuses;
pub mod entitlement_keys;
pub mod invoice_statuses;
pub mod payment_providers;
pub mod payment_statuses;
pub mod plan_cycles;
pub mod purchase_types;
pub mod subscription_statuses;
pub mod webhook_log_statuses;
