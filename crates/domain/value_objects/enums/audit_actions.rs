use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    SubscriptionGranted,
    JobCreditGranted,
    CourseInstallmentApplied,
    DuplicateGuard,
    PaymentRefunded,
    InvoiceVoided,
    EntitlementRevoked,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SubscriptionGranted => "SUBSCRIPTION_GRANTED",
            AuditAction::JobCreditGranted => "JOB_CREDIT_GRANTED",
            AuditAction::CourseInstallmentApplied => "COURSE_INSTALLMENT_APPLIED",
            AuditAction::DuplicateGuard => "DUPLICATE_GUARD",
            AuditAction::PaymentRefunded => "PAYMENT_REFUNDED",
            AuditAction::InvoiceVoided => "INVOICE_VOIDED",
            AuditAction::EntitlementRevoked => "ENTITLEMENT_REVOKED",
        }
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
