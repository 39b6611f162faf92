use anyhow::Result;
use diesel::{PgConnection, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::payments::{InsertPaymentEntity, PaymentEntity, PaymentOutcomeChangeset},
        repositories::payments::PaymentRepository,
    },
    infra::db::postgres::schema::payments,
};

impl PaymentRepository for PgConnection {
    fn find_payment(&mut self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        let payment = payments::table
            .find(payment_id)
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(self)
            .optional()?;

        Ok(payment)
    }

    fn lock_payment(&mut self, payment_id: Uuid) -> Result<Option<PaymentEntity>> {
        let payment = payments::table
            .find(payment_id)
            .select(PaymentEntity::as_select())
            .for_update()
            .first::<PaymentEntity>(self)
            .optional()?;

        Ok(payment)
    }

    fn lock_payment_by_provider_ref(
        &mut self,
        provider: &str,
        provider_ref: &str,
    ) -> Result<Option<PaymentEntity>> {
        let payment = payments::table
            .filter(payments::provider.eq(provider))
            .filter(payments::provider_ref.eq(provider_ref))
            .select(PaymentEntity::as_select())
            .for_update()
            .first::<PaymentEntity>(self)
            .optional()?;

        Ok(payment)
    }

    fn insert_payment(&mut self, payment: InsertPaymentEntity) -> Result<Option<PaymentEntity>> {
        let inserted = insert_into(payments::table)
            .values(&payment)
            .on_conflict((payments::provider, payments::provider_ref))
            .do_nothing()
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(self)
            .optional()?;

        Ok(inserted)
    }

    fn update_payment_outcome(
        &mut self,
        payment_id: Uuid,
        changes: PaymentOutcomeChangeset,
    ) -> Result<PaymentEntity> {
        let payment = update(payments::table.find(payment_id))
            .set(&changes)
            .returning(PaymentEntity::as_returning())
            .get_result::<PaymentEntity>(self)?;

        Ok(payment)
    }
}
