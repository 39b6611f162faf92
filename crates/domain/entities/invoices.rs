use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::invoice_statuses::{InvoiceStatus, InvoiceType},
    infra::db::postgres::schema::invoices,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = invoices)]
pub struct InvoiceEntity {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub invoice_type: String,
    pub status: String,
    pub total: i64,
    pub currency: String,
    pub issued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceEntity {
    pub fn status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::from_str(&self.status)
    }

    pub fn invoice_type(&self) -> Option<InvoiceType> {
        InvoiceType::from_str(&self.invoice_type)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invoices)]
pub struct InsertInvoiceEntity {
    pub payment_id: Uuid,
    pub user_id: Uuid,
    pub invoice_type: String,
    pub status: String,
    pub total: i64,
    pub currency: String,
    pub issued_at: DateTime<Utc>,
}
