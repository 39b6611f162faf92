use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::{
        course_payments::{
            CoursePaymentInstallmentEntity, CoursePaymentPlanEntity,
            InsertCoursePaymentInstallmentEntity, InsertCoursePaymentPlanEntity,
        },
        courses::{CourseEntity, EnrollmentEntity, SemesterEntity},
    },
    value_objects::enums::course_statuses::CoursePaymentMode,
};

pub trait CourseRepository {
    fn find_course(&mut self, course_id: Uuid) -> Result<Option<CourseEntity>>;

    fn find_semester(&mut self, semester_id: Uuid) -> Result<Option<SemesterEntity>>;

    fn find_enrollment(&mut self, enrollment_id: Uuid) -> Result<Option<EnrollmentEntity>>;

    fn lock_enrollment(&mut self, enrollment_id: Uuid) -> Result<Option<EnrollmentEntity>>;

    /// Only a `pending_payment` enrollment can have its mode recorded.
    fn set_enrollment_payment_mode(
        &mut self,
        enrollment_id: Uuid,
        mode: CoursePaymentMode,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `pending_payment -> active`; zero rows when already active or canceled.
    fn activate_enrollment(&mut self, enrollment_id: Uuid, now: DateTime<Utc>) -> Result<bool>;

    fn find_payment_plan(&mut self, enrollment_id: Uuid) -> Result<Option<CoursePaymentPlanEntity>>;

    /// Returns `None` when the enrollment already has a plan.
    fn insert_payment_plan(
        &mut self,
        plan: InsertCoursePaymentPlanEntity,
    ) -> Result<Option<CoursePaymentPlanEntity>>;

    /// Skips rows whose `(enrollment_id, installment_index)` already exists. Returns rows inserted.
    fn insert_installments(
        &mut self,
        installments: Vec<InsertCoursePaymentInstallmentEntity>,
    ) -> Result<u64>;

    /// Ordered by index.
    fn list_installments(
        &mut self,
        enrollment_id: Uuid,
    ) -> Result<Vec<CoursePaymentInstallmentEntity>>;

    /// `due|failed -> paid`; false when the installment was already paid.
    fn mark_installment_paid(
        &mut self,
        enrollment_id: Uuid,
        installment_index: i32,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `due -> failed`; a paid installment is never touched.
    fn mark_installment_failed(
        &mut self,
        enrollment_id: Uuid,
        installment_index: i32,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    fn count_unpaid_installments(&mut self, enrollment_id: Uuid) -> Result<i64>;
}
