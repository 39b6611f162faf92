use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
    value_objects::enums::entitlement_keys::EntitlementKey,
};

pub trait SubscriptionRepository {
    fn find_subscription_by_user(&mut self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Row-locks the user's subscription; every writer goes through this first.
    fn lock_subscription_by_user(&mut self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Returns `None` when the user already has a subscription row.
    fn insert_subscription(
        &mut self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>>;

    fn save_subscription(&mut self, subscription: &SubscriptionEntity) -> Result<SubscriptionEntity>;

    /// Bulk-marks every lapsed, non-expired subscription as expired. Returns the row count.
    fn expire_lapsed_subscriptions(&mut self, now: DateTime<Utc>) -> Result<u64>;

    /// Users holding a subscription row or an entitlement row for `key`.
    fn list_reconcilable_user_ids(&mut self, key: EntitlementKey) -> Result<Vec<Uuid>>;
}
