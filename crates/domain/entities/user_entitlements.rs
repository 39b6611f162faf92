use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::entitlement_keys::EntitlementKey,
    infra::db::postgres::schema::user_entitlements,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = user_entitlements)]
pub struct UserEntitlementEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entitlement_key: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_credits: Option<i32>,
    pub source_payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserEntitlementEntity {
    pub fn key(&self) -> Option<EntitlementKey> {
        EntitlementKey::from_str(&self.entitlement_key)
    }

    /// "Active" means `expires_at IS NULL OR expires_at > now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_entitlements)]
pub struct InsertUserEntitlementEntity {
    pub user_id: Uuid,
    pub entitlement_key: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_credits: Option<i32>,
    pub source_payment_id: Option<Uuid>,
}
