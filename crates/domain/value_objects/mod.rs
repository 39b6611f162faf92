pub mod billing;
pub mod checkout;
pub mod course_pricing;
pub mod enums;
pub mod plans;
pub mod subscriptions;
pub mod sweep;
pub mod webhooks;
