use anyhow::Result;
use backend::usecases::entitlement_sync::EntitlementSyncUseCase;
use billing_core::{
    domain::{repositories::TransactionManager, value_objects::sweep::SweepReport},
    infra::db::postgres::{advisory_lock, postgres_connection::PgPoolSquad},
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Serializes reconciliation passes across worker replicas.
pub trait SweepLock: Send + Sync + 'static {
    /// Runs `f` while holding the lock. `Ok(None)` means another holder has it.
    fn run_exclusive<T, F>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce() -> T;
}

pub struct PgAdvisoryLock {
    db_pool: Arc<PgPoolSquad>,
    key: i64,
}

impl PgAdvisoryLock {
    pub fn new(db_pool: Arc<PgPoolSquad>, key: i64) -> Self {
        Self { db_pool, key }
    }
}

impl SweepLock for PgAdvisoryLock {
    fn run_exclusive<T, F>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce() -> T,
    {
        // The lock is session scoped: this connection must stay checked out until release.
        let mut conn = self.db_pool.get()?;
        if !advisory_lock::try_acquire(&mut conn, self.key)? {
            return Ok(None);
        }

        let output = f();

        match advisory_lock::release(&mut conn, self.key) {
            Ok(true) => {}
            Ok(false) => warn!(key = self.key, "sweep: advisory lock was not held at release"),
            Err(err) => error!(db_error = ?err, key = self.key, "sweep: failed to release advisory lock"),
        }

        Ok(Some(output))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(SweepReport),
    Skipped,
}

pub fn run_tick<L, S>(
    lock: &L,
    usecase: &EntitlementSyncUseCase<S>,
    now: DateTime<Utc>,
) -> Result<TickOutcome>
where
    L: SweepLock,
    S: TransactionManager,
{
    match lock.run_exclusive(|| usecase.sync_all_subscriptions(now))? {
        Some(report) => Ok(TickOutcome::Completed(report?)),
        None => Ok(TickOutcome::Skipped),
    }
}

pub async fn run_sweep_loop<L, S>(
    lock: Arc<L>,
    usecase: Arc<EntitlementSyncUseCase<S>>,
    interval: Duration,
) -> Result<()>
where
    L: SweepLock,
    S: TransactionManager,
{
    info!(interval_secs = interval.as_secs(), "sweep: loop started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let lock = Arc::clone(&lock);
        let usecase = Arc::clone(&usecase);
        let tick = tokio::task::spawn_blocking(move || {
            run_tick(lock.as_ref(), usecase.as_ref(), Utc::now())
        })
        .await;

        match tick {
            Ok(Ok(TickOutcome::Completed(report))) if report.users_failed > 0 => {
                warn!(?report, "sweep: pass finished with failed users")
            }
            Ok(Ok(TickOutcome::Completed(report))) => info!(?report, "sweep: pass finished"),
            Ok(Ok(TickOutcome::Skipped)) => {
                info!("sweep: another worker holds the lock, skipping tick")
            }
            Ok(Err(err)) => error!(error = ?err, "sweep: pass failed"),
            Err(err) => error!(error = %err, "sweep: pass task aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_core::{
        domain::{
            entities::subscriptions::SubscriptionEntity,
            value_objects::enums::{
                plan_cycles::PlanCycle, subscription_statuses::SubscriptionStatus,
            },
        },
        infra::memory::InMemoryBillingStore,
    };
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct FlagLock {
        held: AtomicBool,
    }

    impl SweepLock for FlagLock {
        fn run_exclusive<T, F>(&self, f: F) -> Result<Option<T>>
        where
            F: FnOnce() -> T,
        {
            if self.held.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            let output = f();
            self.held.store(false, Ordering::SeqCst);
            Ok(Some(output))
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn store_with_lapsed_subscription(user_id: Uuid) -> Arc<InMemoryBillingStore> {
        let store = Arc::new(InMemoryBillingStore::new());
        store.seed(|state| {
            let price = state.seed_subscription_price(PlanCycle::Monthly, 100_000);
            let started_at = at(2025, 1, 1);
            state.subscriptions.push(SubscriptionEntity {
                id: Uuid::new_v4(),
                user_id,
                plan_id: price.plan_id.unwrap(),
                status: SubscriptionStatus::Active.to_string(),
                started_at,
                ends_at: at(2025, 2, 1),
                renewal_at: Some(at(2025, 2, 1)),
                cancel_at_period_end: false,
                canceled_at: None,
                provider_ref: None,
                created_at: started_at,
                updated_at: started_at,
            });
        });
        store
    }

    #[test]
    fn tick_expires_lapsed_subscriptions_and_releases_the_lock() {
        let user_id = Uuid::new_v4();
        let store = store_with_lapsed_subscription(user_id);
        let usecase = EntitlementSyncUseCase::new(Arc::clone(&store));
        let lock = FlagLock::default();

        let outcome = run_tick(&lock, &usecase, at(2025, 3, 1)).unwrap();

        let TickOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass, got {outcome:?}");
        };
        assert_eq!(report.expired_marked, 1);
        assert_eq!(report.users_checked, 1);
        assert_eq!(
            store.snapshot().subscription_of(user_id).unwrap().status,
            SubscriptionStatus::Expired.to_string()
        );
        assert!(!lock.held.load(Ordering::SeqCst));
    }

    #[test]
    fn second_tick_without_changes_mutates_nothing() {
        let user_id = Uuid::new_v4();
        let store = store_with_lapsed_subscription(user_id);
        let usecase = EntitlementSyncUseCase::new(Arc::clone(&store));
        let lock = FlagLock::default();

        run_tick(&lock, &usecase, at(2025, 3, 1)).unwrap();
        let outcome = run_tick(&lock, &usecase, at(2025, 3, 1)).unwrap();

        let TickOutcome::Completed(report) = outcome else {
            panic!("expected a completed pass, got {outcome:?}");
        };
        assert_eq!(report.mutations(), 0);
        assert_eq!(report.users_checked, 1);
    }

    #[test]
    fn tick_is_skipped_while_another_holder_has_the_lock() {
        let user_id = Uuid::new_v4();
        let store = store_with_lapsed_subscription(user_id);
        let usecase = EntitlementSyncUseCase::new(Arc::clone(&store));
        let lock = FlagLock::default();
        lock.held.store(true, Ordering::SeqCst);

        let outcome = run_tick(&lock, &usecase, at(2025, 3, 1)).unwrap();

        assert_eq!(outcome, TickOutcome::Skipped);
        assert_eq!(
            store.snapshot().subscription_of(user_id).unwrap().status,
            SubscriptionStatus::Active.to_string()
        );
    }
}
