use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::course_statuses::InstallmentStatus,
    infra::db::postgres::schema::{course_payment_installments, course_payment_plans},
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = course_payment_plans)]
pub struct CoursePaymentPlanEntity {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub semester_id: Uuid,
    pub base_amount: i64,
    pub discount_amount: i64,
    pub lumpsum_amount: i64,
    pub installments_total: i64,
    pub installment_count: i32,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = course_payment_plans)]
pub struct InsertCoursePaymentPlanEntity {
    pub enrollment_id: Uuid,
    pub semester_id: Uuid,
    pub base_amount: i64,
    pub discount_amount: i64,
    pub lumpsum_amount: i64,
    pub installments_total: i64,
    pub installment_count: i32,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = course_payment_installments)]
pub struct CoursePaymentInstallmentEntity {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub enrollment_id: Uuid,
    pub installment_index: i32,
    pub amount: i64,
    pub status: String,
    pub due_at: DateTime<Utc>,
    pub paid_payment_id: Option<Uuid>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CoursePaymentInstallmentEntity {
    pub fn status(&self) -> Option<InstallmentStatus> {
        InstallmentStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = course_payment_installments)]
pub struct InsertCoursePaymentInstallmentEntity {
    pub plan_id: Uuid,
    pub enrollment_id: Uuid,
    pub installment_index: i32,
    pub amount: i64,
    pub status: String,
    pub due_at: DateTime<Utc>,
}
