use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::user_entitlements::{InsertUserEntitlementEntity, UserEntitlementEntity},
    value_objects::enums::entitlement_keys::EntitlementKey,
};

pub trait EntitlementRepository {
    /// Most recent time-bounded row for the key, ordered by `expires_at` descending.
    fn latest_entitlement(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
    ) -> Result<Option<UserEntitlementEntity>>;

    fn insert_entitlement(
        &mut self,
        entitlement: InsertUserEntitlementEntity,
    ) -> Result<UserEntitlementEntity>;

    fn set_entitlement_expiry(
        &mut self,
        entitlement_id: Uuid,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Adds to the counted balance, creating the balance row on first use. Returns the new balance.
    fn add_entitlement_credits(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
        credits: i32,
        source_payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i32>;

    /// Takes one credit when the balance is positive. Returns the new balance, or `None` when empty.
    fn take_entitlement_credit(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>>;

    /// Current counted balance; zero when the user never had one.
    fn credit_balance(&mut self, user_id: Uuid, key: EntitlementKey) -> Result<i32>;
}
