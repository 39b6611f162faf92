use anyhow::Result;
use uuid::Uuid;

use crate::domain::entities::checkout_sessions::{
    CheckoutSessionEntity, InsertCheckoutSessionEntity,
};

pub trait CheckoutSessionRepository {
    fn find_checkout_session(&mut self, session_id: Uuid) -> Result<Option<CheckoutSessionEntity>>;

    fn find_checkout_session_by_idempotency_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<CheckoutSessionEntity>>;

    /// Returns `None` when the idempotency key is already taken.
    fn insert_checkout_session(
        &mut self,
        session: InsertCheckoutSessionEntity,
    ) -> Result<Option<CheckoutSessionEntity>>;

    /// Stamps the redirect only while none is set; returns the row as stored afterwards.
    fn set_checkout_redirect_url(
        &mut self,
        session_id: Uuid,
        redirect_url: &str,
    ) -> Result<CheckoutSessionEntity>;
}
