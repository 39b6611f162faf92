use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait ProfileVisibilityRepository {
    /// Unpublishes the profile unless the user still holds an active publish entitlement.
    /// Returns whether the profile was actually flipped.
    fn auto_unpublish_if_no_entitlement(&mut self, user_id: Uuid, now: DateTime<Utc>)
    -> Result<bool>;
}
