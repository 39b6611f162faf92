use anyhow::Result;

use crate::domain::{
    entities::audit_logs::InsertAuditLogEntity,
    value_objects::enums::audit_actions::AuditAction,
};

pub trait AuditLogRepository {
    fn append_audit_log(&mut self, record: InsertAuditLogEntity) -> Result<()>;

    fn has_audit_marker(&mut self, resource: &str, action: AuditAction) -> Result<bool>;
}
