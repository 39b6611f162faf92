use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::value_objects::enums::course_statuses::CoursePaymentMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingBreakdown {
    pub base_amount: i64,
    pub discount_amount: i64,
    pub lumpsum_amount: i64,
    pub installments_total: i64,
    pub installment_amounts: Vec<i64>,
}

impl PricingBreakdown {
    /// Lump-sum pays the discounted total; installments split the undiscounted tuition
    /// evenly and the last installment absorbs the remainder (zero when it divides evenly).
    pub fn compute(tuition: i64, discount_percent: i32, installment_count: i32) -> Self {
        let discount_percent = i64::from(discount_percent.clamp(0, 100));
        let discount_amount = tuition * discount_percent / 100;
        let count = i64::from(installment_count.max(1));
        let per_installment = tuition / count;
        let remainder = tuition - per_installment * count;

        let mut installment_amounts = vec![per_installment; count as usize];
        if let Some(last) = installment_amounts.last_mut() {
            *last += remainder;
        }

        Self {
            base_amount: tuition,
            discount_amount,
            lumpsum_amount: tuition - discount_amount,
            installments_total: tuition,
            installment_amounts,
        }
    }
}

/// Same enrollment, mode, installment and amount map to the same key, so resubmitting an
/// unresolved attempt reuses its checkout session instead of opening a parallel one.
pub fn course_checkout_idempotency_key(
    enrollment_id: Uuid,
    mode: CoursePaymentMode,
    installment_index: Option<i32>,
    amount: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(enrollment_id.as_bytes());
    hasher.update(mode.as_str().as_bytes());
    hasher.update(installment_index.unwrap_or(0).to_be_bytes());
    hasher.update(amount.to_be_bytes());
    format!("course:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_has_zero_remainder() {
        let breakdown = PricingBreakdown::compute(3_000_000, 10, 3);
        assert_eq!(breakdown.installment_amounts, vec![1_000_000, 1_000_000, 1_000_000]);
        assert_eq!(breakdown.installments_total, 3_000_000);
        assert_eq!(breakdown.discount_amount, 300_000);
        assert_eq!(breakdown.lumpsum_amount, 2_700_000);
    }

    #[test]
    fn last_installment_absorbs_rounding() {
        let breakdown = PricingBreakdown::compute(1_000_000, 0, 3);
        assert_eq!(breakdown.installment_amounts, vec![333_333, 333_333, 333_334]);
        assert_eq!(breakdown.installment_amounts.iter().sum::<i64>(), 1_000_000);
        assert_eq!(breakdown.installment_amounts.last(), Some(&333_334));
    }

    #[test]
    fn idempotency_key_changes_with_every_component() {
        let enrollment_id = Uuid::new_v4();
        let base = course_checkout_idempotency_key(
            enrollment_id,
            CoursePaymentMode::Installments,
            Some(1),
            1_000,
        );

        assert_eq!(
            base,
            course_checkout_idempotency_key(enrollment_id, CoursePaymentMode::Installments, Some(1), 1_000)
        );
        assert_ne!(
            base,
            course_checkout_idempotency_key(enrollment_id, CoursePaymentMode::Installments, Some(2), 1_000)
        );
        assert_ne!(
            base,
            course_checkout_idempotency_key(enrollment_id, CoursePaymentMode::Installments, Some(1), 1_001)
        );
        assert_ne!(
            base,
            course_checkout_idempotency_key(enrollment_id, CoursePaymentMode::Lumpsum, Some(1), 1_000)
        );
    }
}
