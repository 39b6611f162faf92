use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::{PgConnection, dsl::exists, prelude::*, select, update};
use uuid::Uuid;

use crate::{
    domain::{
        repositories::profiles::ProfileVisibilityRepository,
        value_objects::enums::entitlement_keys::EntitlementKey,
    },
    infra::db::postgres::schema::{profiles, user_entitlements},
};

impl ProfileVisibilityRepository for PgConnection {
    fn auto_unpublish_if_no_entitlement(
        &mut self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let still_entitled = select(exists(
            user_entitlements::table
                .filter(user_entitlements::user_id.eq(user_id))
                .filter(
                    user_entitlements::entitlement_key
                        .eq(EntitlementKey::CanPublishProfile.as_str()),
                )
                .filter(
                    user_entitlements::expires_at
                        .is_null()
                        .or(user_entitlements::expires_at.gt(now)),
                ),
        ))
        .get_result::<bool>(self)?;

        if still_entitled {
            return Ok(false);
        }

        let rows = update(profiles::table.find(user_id))
            .filter(profiles::is_published.eq(true))
            .set((
                profiles::is_published.eq(false),
                profiles::updated_at.eq(now),
            ))
            .execute(self)?;

        Ok(rows == 1)
    }
}
