use anyhow::Result;
use diesel::{PgConnection, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::checkout_sessions::{CheckoutSessionEntity, InsertCheckoutSessionEntity},
        repositories::checkout_sessions::CheckoutSessionRepository,
    },
    infra::db::postgres::schema::checkout_sessions,
};

impl CheckoutSessionRepository for PgConnection {
    fn find_checkout_session(&mut self, session_id: Uuid) -> Result<Option<CheckoutSessionEntity>> {
        let session = checkout_sessions::table
            .find(session_id)
            .select(CheckoutSessionEntity::as_select())
            .first::<CheckoutSessionEntity>(self)
            .optional()?;

        Ok(session)
    }

    fn find_checkout_session_by_idempotency_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<CheckoutSessionEntity>> {
        let session = checkout_sessions::table
            .filter(checkout_sessions::idempotency_key.eq(idempotency_key))
            .select(CheckoutSessionEntity::as_select())
            .first::<CheckoutSessionEntity>(self)
            .optional()?;

        Ok(session)
    }

    fn insert_checkout_session(
        &mut self,
        session: InsertCheckoutSessionEntity,
    ) -> Result<Option<CheckoutSessionEntity>> {
        let inserted = insert_into(checkout_sessions::table)
            .values(&session)
            .on_conflict(checkout_sessions::idempotency_key)
            .do_nothing()
            .returning(CheckoutSessionEntity::as_returning())
            .get_result::<CheckoutSessionEntity>(self)
            .optional()?;

        Ok(inserted)
    }

    fn set_checkout_redirect_url(
        &mut self,
        session_id: Uuid,
        redirect_url: &str,
    ) -> Result<CheckoutSessionEntity> {
        update(checkout_sessions::table.find(session_id))
            .filter(checkout_sessions::redirect_url.is_null())
            .set(checkout_sessions::redirect_url.eq(Some(redirect_url)))
            .execute(self)?;

        let session = checkout_sessions::table
            .find(session_id)
            .select(CheckoutSessionEntity::as_select())
            .first::<CheckoutSessionEntity>(self)?;

        Ok(session)
    }
}
