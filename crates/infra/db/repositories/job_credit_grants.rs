use anyhow::Result;
use diesel::{PgConnection, insert_into, prelude::*};

use crate::{
    domain::{
        entities::job_credit_grants::{InsertJobCreditGrantEntity, JobCreditGrantEntity},
        repositories::job_credit_grants::JobCreditGrantRepository,
    },
    infra::db::postgres::schema::job_credit_grants,
};

impl JobCreditGrantRepository for PgConnection {
    fn insert_job_credit_grant(
        &mut self,
        grant: InsertJobCreditGrantEntity,
    ) -> Result<Option<JobCreditGrantEntity>> {
        let inserted = insert_into(job_credit_grants::table)
            .values(&grant)
            .on_conflict(job_credit_grants::payment_id)
            .do_nothing()
            .returning(JobCreditGrantEntity::as_returning())
            .get_result::<JobCreditGrantEntity>(self)
            .optional()?;

        Ok(inserted)
    }
}
