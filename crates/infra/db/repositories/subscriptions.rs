use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        repositories::subscriptions::SubscriptionRepository,
        value_objects::enums::{
            entitlement_keys::EntitlementKey, subscription_statuses::SubscriptionStatus,
        },
    },
    infra::db::postgres::schema::{subscriptions, user_entitlements},
};

impl SubscriptionRepository for PgConnection {
    fn find_subscription_by_user(&mut self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(self)
            .optional()?;

        Ok(subscription)
    }

    fn lock_subscription_by_user(&mut self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let subscription = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .select(SubscriptionEntity::as_select())
            .for_update()
            .first::<SubscriptionEntity>(self)
            .optional()?;

        Ok(subscription)
    }

    fn insert_subscription(
        &mut self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>> {
        let inserted = insert_into(subscriptions::table)
            .values(&subscription)
            .on_conflict(subscriptions::user_id)
            .do_nothing()
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(self)
            .optional()?;

        Ok(inserted)
    }

    fn save_subscription(&mut self, subscription: &SubscriptionEntity) -> Result<SubscriptionEntity> {
        let saved = update(subscriptions::table.find(subscription.id))
            .set(subscription)
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(self)?;

        Ok(saved)
    }

    fn expire_lapsed_subscriptions(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let rows = update(subscriptions::table)
            .filter(subscriptions::ends_at.lt(now))
            .filter(subscriptions::status.ne(SubscriptionStatus::Expired.as_str()))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Expired.as_str()),
                subscriptions::updated_at.eq(now),
            ))
            .execute(self)?;

        Ok(rows as u64)
    }

    fn list_reconcilable_user_ids(&mut self, key: EntitlementKey) -> Result<Vec<Uuid>> {
        let user_ids = subscriptions::table
            .select(subscriptions::user_id)
            .union(
                user_entitlements::table
                    .filter(user_entitlements::entitlement_key.eq(key.as_str()))
                    .select(user_entitlements::user_id),
            )
            .load::<Uuid>(self)?;

        Ok(user_ids)
    }
}
