use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

/// Why a payment-driven effect was skipped. Skips are steady-state results, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotAppliedReason {
    NotSubscriptionProduct,
    NotJobCreditProduct,
    AlreadyGranted,
    PaymentNotPaid,
    NoCreditsConfigured,
}

impl NotAppliedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotAppliedReason::NotSubscriptionProduct => "NOT_SUBSCRIPTION_PRODUCT",
            NotAppliedReason::NotJobCreditProduct => "NOT_JOB_CREDIT_PRODUCT",
            NotAppliedReason::AlreadyGranted => "ALREADY_GRANTED",
            NotAppliedReason::PaymentNotPaid => "PAYMENT_NOT_PAID",
            NotAppliedReason::NoCreditsConfigured => "NO_CREDITS_CONFIGURED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubscriptionApplyOutcome {
    Applied {
        subscription_id: Uuid,
        status: SubscriptionStatus,
        ends_at: DateTime<Utc>,
        restarted: bool,
    },
    NotApplied { reason: NotAppliedReason },
}

impl SubscriptionApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SubscriptionApplyOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobCreditApplyOutcome {
    Applied { credits: i32, remaining_credits: i32 },
    NotApplied { reason: NotAppliedReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseApplyOutcome {
    EnrollmentActivated,
    InstallmentPaid { index: i32, remaining: i64 },
    InstallmentFailed { index: i32 },
    AlreadyApplied,
    Ignored,
}

/// What a webhook-driven payment ended up doing downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchEffect {
    Subscription { outcome: SubscriptionApplyOutcome },
    JobCredit { outcome: JobCreditApplyOutcome },
    Course { outcome: CourseApplyOutcome },
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn applied_subscription_keeps_its_status_next_to_the_result_tag() {
        let subscription_id = Uuid::new_v4();
        let ends_at = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let effect = DispatchEffect::Subscription {
            outcome: SubscriptionApplyOutcome::Applied {
                subscription_id,
                status: SubscriptionStatus::Active,
                ends_at,
                restarted: true,
            },
        };

        let value = serde_json::to_value(&effect).unwrap();

        assert_eq!(value["kind"], "subscription");
        assert_eq!(value["outcome"]["result"], "applied");
        assert_eq!(value["outcome"]["status"], "active");
        assert_eq!(value["outcome"]["subscription_id"], json!(subscription_id));
    }

    #[test]
    fn skipped_effects_carry_a_reason_code() {
        let outcome = JobCreditApplyOutcome::NotApplied {
            reason: NotAppliedReason::AlreadyGranted,
        };

        let value = serde_json::to_value(&outcome).unwrap();

        assert_eq!(value, json!({ "result": "not_applied", "reason": "ALREADY_GRANTED" }));
    }
}
