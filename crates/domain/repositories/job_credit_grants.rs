use anyhow::Result;

use crate::domain::entities::job_credit_grants::{
    InsertJobCreditGrantEntity, JobCreditGrantEntity,
};

pub trait JobCreditGrantRepository {
    /// Returns `None` when the payment already produced a grant.
    fn insert_job_credit_grant(
        &mut self,
        grant: InsertJobCreditGrantEntity,
    ) -> Result<Option<JobCreditGrantEntity>>;
}
