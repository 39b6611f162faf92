use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, dsl::count_star, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            course_payments::{
                CoursePaymentInstallmentEntity, CoursePaymentPlanEntity,
                InsertCoursePaymentInstallmentEntity, InsertCoursePaymentPlanEntity,
            },
            courses::{CourseEntity, EnrollmentEntity, SemesterEntity},
        },
        repositories::courses::CourseRepository,
        value_objects::enums::course_statuses::{
            CoursePaymentMode, EnrollmentStatus, InstallmentStatus,
        },
    },
    infra::db::postgres::schema::{
        course_payment_installments, course_payment_plans, courses, enrollments, semesters,
    },
};

impl CourseRepository for PgConnection {
    fn find_course(&mut self, course_id: Uuid) -> Result<Option<CourseEntity>> {
        let course = courses::table
            .find(course_id)
            .select(CourseEntity::as_select())
            .first::<CourseEntity>(self)
            .optional()?;

        Ok(course)
    }

    fn find_semester(&mut self, semester_id: Uuid) -> Result<Option<SemesterEntity>> {
        let semester = semesters::table
            .find(semester_id)
            .select(SemesterEntity::as_select())
            .first::<SemesterEntity>(self)
            .optional()?;

        Ok(semester)
    }

    fn find_enrollment(&mut self, enrollment_id: Uuid) -> Result<Option<EnrollmentEntity>> {
        let enrollment = enrollments::table
            .find(enrollment_id)
            .select(EnrollmentEntity::as_select())
            .first::<EnrollmentEntity>(self)
            .optional()?;

        Ok(enrollment)
    }

    fn lock_enrollment(&mut self, enrollment_id: Uuid) -> Result<Option<EnrollmentEntity>> {
        let enrollment = enrollments::table
            .find(enrollment_id)
            .select(EnrollmentEntity::as_select())
            .for_update()
            .first::<EnrollmentEntity>(self)
            .optional()?;

        Ok(enrollment)
    }

    fn set_enrollment_payment_mode(
        &mut self,
        enrollment_id: Uuid,
        mode: CoursePaymentMode,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = update(enrollments::table.find(enrollment_id))
            .filter(enrollments::status.eq(EnrollmentStatus::PendingPayment.as_str()))
            .set((
                enrollments::payment_mode.eq(Some(mode.as_str())),
                enrollments::updated_at.eq(now),
            ))
            .execute(self)?;

        Ok(rows == 1)
    }

    fn activate_enrollment(&mut self, enrollment_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let rows = update(enrollments::table.find(enrollment_id))
            .filter(enrollments::status.eq(EnrollmentStatus::PendingPayment.as_str()))
            .set((
                enrollments::status.eq(EnrollmentStatus::Active.as_str()),
                enrollments::activated_at.eq(Some(now)),
                enrollments::updated_at.eq(now),
            ))
            .execute(self)?;

        Ok(rows == 1)
    }

    fn find_payment_plan(&mut self, enrollment_id: Uuid) -> Result<Option<CoursePaymentPlanEntity>> {
        let plan = course_payment_plans::table
            .filter(course_payment_plans::enrollment_id.eq(enrollment_id))
            .select(CoursePaymentPlanEntity::as_select())
            .first::<CoursePaymentPlanEntity>(self)
            .optional()?;

        Ok(plan)
    }

    fn insert_payment_plan(
        &mut self,
        plan: InsertCoursePaymentPlanEntity,
    ) -> Result<Option<CoursePaymentPlanEntity>> {
        let inserted = insert_into(course_payment_plans::table)
            .values(&plan)
            .on_conflict(course_payment_plans::enrollment_id)
            .do_nothing()
            .returning(CoursePaymentPlanEntity::as_returning())
            .get_result::<CoursePaymentPlanEntity>(self)
            .optional()?;

        Ok(inserted)
    }

    fn insert_installments(
        &mut self,
        installments: Vec<InsertCoursePaymentInstallmentEntity>,
    ) -> Result<u64> {
        let rows = insert_into(course_payment_installments::table)
            .values(&installments)
            .on_conflict((
                course_payment_installments::enrollment_id,
                course_payment_installments::installment_index,
            ))
            .do_nothing()
            .execute(self)?;

        Ok(rows as u64)
    }

    fn list_installments(
        &mut self,
        enrollment_id: Uuid,
    ) -> Result<Vec<CoursePaymentInstallmentEntity>> {
        let installments = course_payment_installments::table
            .filter(course_payment_installments::enrollment_id.eq(enrollment_id))
            .order(course_payment_installments::installment_index.asc())
            .select(CoursePaymentInstallmentEntity::as_select())
            .load::<CoursePaymentInstallmentEntity>(self)?;

        Ok(installments)
    }

    fn mark_installment_paid(
        &mut self,
        enrollment_id: Uuid,
        installment_index: i32,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = update(course_payment_installments::table)
            .filter(course_payment_installments::enrollment_id.eq(enrollment_id))
            .filter(course_payment_installments::installment_index.eq(installment_index))
            .filter(course_payment_installments::status.ne(InstallmentStatus::Paid.as_str()))
            .set((
                course_payment_installments::status.eq(InstallmentStatus::Paid.as_str()),
                course_payment_installments::paid_payment_id.eq(Some(payment_id)),
                course_payment_installments::paid_at.eq(Some(now)),
                course_payment_installments::updated_at.eq(now),
            ))
            .execute(self)?;

        Ok(rows == 1)
    }

    fn mark_installment_failed(
        &mut self,
        enrollment_id: Uuid,
        installment_index: i32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = update(course_payment_installments::table)
            .filter(course_payment_installments::enrollment_id.eq(enrollment_id))
            .filter(course_payment_installments::installment_index.eq(installment_index))
            .filter(course_payment_installments::status.eq(InstallmentStatus::Due.as_str()))
            .set((
                course_payment_installments::status.eq(InstallmentStatus::Failed.as_str()),
                course_payment_installments::updated_at.eq(now),
            ))
            .execute(self)?;

        Ok(rows == 1)
    }

    fn count_unpaid_installments(&mut self, enrollment_id: Uuid) -> Result<i64> {
        let unpaid = course_payment_installments::table
            .filter(course_payment_installments::enrollment_id.eq(enrollment_id))
            .filter(course_payment_installments::status.ne(InstallmentStatus::Paid.as_str()))
            .select(count_star())
            .get_result::<i64>(self)?;

        Ok(unpaid)
    }
}
