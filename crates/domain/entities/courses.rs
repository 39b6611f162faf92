use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::course_statuses::{
        CoursePaymentMode, EnrollmentStatus, SemesterStatus,
    },
    infra::db::postgres::schema::{courses, enrollments, semesters},
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = courses)]
pub struct CourseEntity {
    pub id: Uuid,
    pub title: String,
    pub is_published: bool,
}

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = semesters)]
pub struct SemesterEntity {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub status: String,
    pub tuition_amount: i64,
    pub currency: String,
    pub lumpsum_discount_percent: i32,
    pub installments_enabled: bool,
    pub installment_count: i32,
    pub installment_interval_days: i32,
}

impl SemesterEntity {
    pub fn status(&self) -> SemesterStatus {
        SemesterStatus::from_str(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = enrollments)]
pub struct EnrollmentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub semester_id: Uuid,
    pub status: String,
    pub payment_mode: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrollmentEntity {
    pub fn status(&self) -> Option<EnrollmentStatus> {
        EnrollmentStatus::from_str(&self.status)
    }

    pub fn payment_mode(&self) -> Option<CoursePaymentMode> {
        self.payment_mode
            .as_deref()
            .and_then(CoursePaymentMode::from_str)
    }
}
