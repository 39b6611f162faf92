use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::invoices::{InsertInvoiceEntity, InvoiceEntity},
        repositories::invoices::InvoiceRepository,
        value_objects::enums::invoice_statuses::InvoiceStatus,
    },
    infra::db::postgres::schema::invoices,
};

impl InvoiceRepository for PgConnection {
    fn insert_invoice(&mut self, invoice: InsertInvoiceEntity) -> Result<Option<InvoiceEntity>> {
        let inserted = insert_into(invoices::table)
            .values(&invoice)
            .on_conflict(invoices::payment_id)
            .do_nothing()
            .returning(InvoiceEntity::as_returning())
            .get_result::<InvoiceEntity>(self)
            .optional()?;

        Ok(inserted)
    }

    fn find_invoice_by_payment(&mut self, payment_id: Uuid) -> Result<Option<InvoiceEntity>> {
        let invoice = invoices::table
            .filter(invoices::payment_id.eq(payment_id))
            .select(InvoiceEntity::as_select())
            .first::<InvoiceEntity>(self)
            .optional()?;

        Ok(invoice)
    }

    fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<InvoiceEntity>> {
        let invoice = invoices::table
            .find(invoice_id)
            .select(InvoiceEntity::as_select())
            .for_update()
            .first::<InvoiceEntity>(self)
            .optional()?;

        Ok(invoice)
    }

    fn update_invoice_status(
        &mut self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<InvoiceEntity> {
        let invoice = update(invoices::table.find(invoice_id))
            .set((
                invoices::status.eq(status.as_str()),
                invoices::updated_at.eq(updated_at),
            ))
            .returning(InvoiceEntity::as_returning())
            .get_result::<InvoiceEntity>(self)?;

        Ok(invoice)
    }
}
