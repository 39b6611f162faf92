use anyhow::Result;
use uuid::Uuid;

use crate::domain::entities::payments::{
    InsertPaymentEntity, PaymentEntity, PaymentOutcomeChangeset,
};

pub trait PaymentRepository {
    fn find_payment(&mut self, payment_id: Uuid) -> Result<Option<PaymentEntity>>;

    /// Row-locks the payment for the rest of the transaction.
    fn lock_payment(&mut self, payment_id: Uuid) -> Result<Option<PaymentEntity>>;

    fn lock_payment_by_provider_ref(
        &mut self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentEntity>>;

    /// Returns `None` when `(provider, provider_ref)` already exists.
    fn insert_payment(&mut self, payment: InsertPaymentEntity) -> Result<Option<PaymentEntity>>;

    fn update_payment_outcome(
        &mut self,
        payment_id: Uuid,
        changes: PaymentOutcomeChangeset,
    ) -> Result<PaymentEntity>;
}
