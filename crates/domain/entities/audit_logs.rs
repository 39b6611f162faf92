use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::audit_actions::AuditAction,
    infra::db::postgres::schema::audit_logs,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = audit_logs)]
pub struct AuditLogEntity {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub reason: Option<String>,
    pub resource: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct InsertAuditLogEntity {
    pub actor: String,
    pub action: String,
    pub reason: Option<String>,
    pub resource: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl InsertAuditLogEntity {
    pub fn new(actor: &str, action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.to_string(),
            reason: None,
            resource: resource.into(),
            before: None,
            after: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_before(mut self, before: serde_json::Value) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }
}

/// Resource key used for payment-scoped audit markers.
pub fn payment_resource(payment_id: Uuid) -> String {
    format!("payment:{payment_id}")
}
