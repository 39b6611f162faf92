use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::{PgConnection, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::user_entitlements::{InsertUserEntitlementEntity, UserEntitlementEntity},
        repositories::entitlements::EntitlementRepository,
        value_objects::enums::entitlement_keys::EntitlementKey,
    },
    infra::db::postgres::schema::user_entitlements,
};

impl EntitlementRepository for PgConnection {
    fn latest_entitlement(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
    ) -> Result<Option<UserEntitlementEntity>> {
        // Postgres sorts NULL first under DESC, so a never-expiring row wins.
        let entitlement = user_entitlements::table
            .filter(user_entitlements::user_id.eq(user_id))
            .filter(user_entitlements::entitlement_key.eq(key.as_str()))
            .filter(user_entitlements::remaining_credits.is_null())
            .order(user_entitlements::expires_at.desc())
            .select(UserEntitlementEntity::as_select())
            .for_update()
            .first::<UserEntitlementEntity>(self)
            .optional()?;

        Ok(entitlement)
    }

    fn insert_entitlement(
        &mut self,
        entitlement: InsertUserEntitlementEntity,
    ) -> Result<UserEntitlementEntity> {
        let inserted = insert_into(user_entitlements::table)
            .values(&entitlement)
            .returning(UserEntitlementEntity::as_returning())
            .get_result::<UserEntitlementEntity>(self)?;

        Ok(inserted)
    }

    fn set_entitlement_expiry(
        &mut self,
        entitlement_id: Uuid,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        update(user_entitlements::table.find(entitlement_id))
            .set((
                user_entitlements::expires_at.eq(Some(expires_at)),
                user_entitlements::updated_at.eq(updated_at),
            ))
            .execute(self)?;

        Ok(())
    }

    fn add_entitlement_credits(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
        credits: i32,
        source_payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<i32> {
        // The partial unique index on counted rows turns a racing first insert into a no-op.
        insert_into(user_entitlements::table)
            .values(&InsertUserEntitlementEntity {
                user_id,
                entitlement_key: key.to_string(),
                expires_at: None,
                remaining_credits: Some(0),
                source_payment_id: Some(source_payment_id),
            })
            .on_conflict_do_nothing()
            .execute(self)?;

        let balance = update(user_entitlements::table)
            .filter(user_entitlements::user_id.eq(user_id))
            .filter(user_entitlements::entitlement_key.eq(key.as_str()))
            .filter(user_entitlements::remaining_credits.is_not_null())
            .set((
                user_entitlements::remaining_credits
                    .eq(user_entitlements::remaining_credits + credits),
                user_entitlements::source_payment_id.eq(Some(source_payment_id)),
                user_entitlements::updated_at.eq(now),
            ))
            .returning(user_entitlements::remaining_credits)
            .get_result::<Option<i32>>(self)?;

        balance.context("credit balance row has no remaining_credits")
    }

    fn take_entitlement_credit(
        &mut self,
        user_id: Uuid,
        key: EntitlementKey,
        now: DateTime<Utc>,
    ) -> Result<Option<i32>> {
        let balance = update(user_entitlements::table)
            .filter(user_entitlements::user_id.eq(user_id))
            .filter(user_entitlements::entitlement_key.eq(key.as_str()))
            .filter(user_entitlements::remaining_credits.gt(0))
            .set((
                user_entitlements::remaining_credits.eq(user_entitlements::remaining_credits - 1),
                user_entitlements::updated_at.eq(now),
            ))
            .returning(user_entitlements::remaining_credits)
            .get_result::<Option<i32>>(self)
            .optional()?;

        Ok(balance.flatten())
    }

    fn credit_balance(&mut self, user_id: Uuid, key: EntitlementKey) -> Result<i32> {
        let balance = user_entitlements::table
            .filter(user_entitlements::user_id.eq(user_id))
            .filter(user_entitlements::entitlement_key.eq(key.as_str()))
            .filter(user_entitlements::remaining_credits.is_not_null())
            .select(user_entitlements::remaining_credits)
            .first::<Option<i32>>(self)
            .optional()?;

        Ok(balance.flatten().unwrap_or(0))
    }
}
