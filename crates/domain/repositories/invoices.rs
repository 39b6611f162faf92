use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::invoices::{InsertInvoiceEntity, InvoiceEntity},
    value_objects::enums::invoice_statuses::InvoiceStatus,
};

pub trait InvoiceRepository {
    /// Returns `None` when the payment already has an invoice.
    fn insert_invoice(&mut self, invoice: InsertInvoiceEntity) -> Result<Option<InvoiceEntity>>;

    fn find_invoice_by_payment(&mut self, payment_id: Uuid) -> Result<Option<InvoiceEntity>>;

    fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<InvoiceEntity>>;

    fn update_invoice_status(
        &mut self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<InvoiceEntity>;
}
