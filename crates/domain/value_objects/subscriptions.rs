use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::SubscriptionEntity,
    value_objects::enums::{plan_cycles::PlanCycle, subscription_statuses::SubscriptionStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPeriod {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl SubscriptionPeriod {
    /// A fresh period always starts at `now`.
    pub fn starting_now(cycle: PlanCycle, now: DateTime<Utc>) -> Result<Self> {
        let ends_at = cycle
            .add_to(now)
            .context("failed to compute subscription end date")?;
        Ok(Self {
            starts_at: now,
            ends_at,
        })
    }

    /// Renewal stacks on the current period while it is still running, and restarts from
    /// `now` once it has lapsed, so the gap is never credited retroactively.
    pub fn renewal(cycle: PlanCycle, current_ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<Self> {
        let starts_at = if now < current_ends_at {
            current_ends_at
        } else {
            now
        };
        let ends_at = cycle
            .add_to(starts_at)
            .context("failed to compute renewed subscription end date")?;
        Ok(Self { starts_at, ends_at })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub renewal_at: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

impl From<SubscriptionEntity> for SubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            plan_id: value.plan_id,
            status: value.status(),
            started_at: value.started_at,
            ends_at: value.ends_at,
            renewal_at: value.renewal_at,
            cancel_at_period_end: value.cancel_at_period_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn renewal_before_lapse_stacks_on_current_end() {
        let ends_at = at(2025, 2, 1);
        let now = ends_at - Duration::hours(1);

        let period = SubscriptionPeriod::renewal(PlanCycle::Monthly, ends_at, now).unwrap();

        assert_eq!(period.starts_at, ends_at);
        assert_eq!(period.ends_at, at(2025, 3, 1));
    }

    #[test]
    fn renewal_after_lapse_restarts_from_now() {
        let ends_at = at(2025, 2, 1);
        let now = ends_at + Duration::days(2);

        let period = SubscriptionPeriod::renewal(PlanCycle::Monthly, ends_at, now).unwrap();

        assert_eq!(period.starts_at, now);
        assert_eq!(period.ends_at, at(2025, 3, 3));
    }

    #[test]
    fn renewal_exactly_at_end_counts_as_lapsed() {
        let ends_at = at(2025, 2, 1);
        let period = SubscriptionPeriod::renewal(PlanCycle::Monthly, ends_at, ends_at).unwrap();
        assert_eq!(period.starts_at, ends_at);
        assert_eq!(period.ends_at, at(2025, 3, 1));
    }
}
