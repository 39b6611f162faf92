use anyhow::Result;
use diesel::{PgConnection, dsl::exists, insert_into, prelude::*, select};

use crate::{
    domain::{
        entities::audit_logs::InsertAuditLogEntity,
        repositories::audit_logs::AuditLogRepository,
        value_objects::enums::audit_actions::AuditAction,
    },
    infra::db::postgres::schema::audit_logs,
};

impl AuditLogRepository for PgConnection {
    fn append_audit_log(&mut self, record: InsertAuditLogEntity) -> Result<()> {
        insert_into(audit_logs::table)
            .values(&record)
            .execute(self)?;

        Ok(())
    }

    fn has_audit_marker(&mut self, resource: &str, action: AuditAction) -> Result<bool> {
        let found = select(exists(
            audit_logs::table
                .filter(audit_logs::resource.eq(resource))
                .filter(audit_logs::action.eq(action.as_str())),
        ))
        .get_result::<bool>(self)?;

        Ok(found)
    }
}
