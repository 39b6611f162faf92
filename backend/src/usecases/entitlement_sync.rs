use std::sync::Arc;
use billing_core::domain::repositories::{subscriptions::SubscriptionRepository};

use billing_core::domain::{
    entities::{audit_logs::InsertAuditLogEntity, user_entitlements::InsertUserEntitlementEntity},
    repositories::{BillingTx, TransactionManager},
    value_objects::{
        enums::{audit_actions::AuditAction, entitlement_keys::EntitlementKey},
        sweep::{SweepReport, UserSyncReport},
    },
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const RECONCILIATION_ACTOR: &str = "system:reconciliation";

#[derive(Debug, Error)]
pub enum EntitlementSyncError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EntitlementSyncError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub type UseCaseResult<T> = std::result::Result<T, EntitlementSyncError>;

/// Makes sure the user holds an active `CAN_PUBLISH_PROFILE` reaching at least `ends_at`.
///
/// An active row is extended when it would lapse earlier and is never shortened; otherwise a
/// fresh row is written. Returns whether anything changed.
pub fn ensure_publish_entitlement<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    ends_at: DateTime<Utc>,
    source_payment_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let latest = tx.latest_entitlement(user_id, EntitlementKey::CanPublishProfile)?;

    match latest {
        Some(entitlement) if entitlement.is_active(now) => {
            let stale = entitlement
                .expires_at
                .is_some_and(|expires_at| expires_at < ends_at);
            if stale {
                tx.set_entitlement_expiry(entitlement.id, ends_at, now)?;
            }
            Ok(stale)
        }
        _ => {
            tx.insert_entitlement(InsertUserEntitlementEntity {
                user_id,
                entitlement_key: EntitlementKey::CanPublishProfile.to_string(),
                expires_at: Some(ends_at),
                remaining_credits: None,
                source_payment_id,
            })?;
            Ok(true)
        }
    }
}

/// Aligns one user's publish entitlement and profile visibility with their subscription.
/// Running it twice in a row changes nothing the second time.
pub fn sync_single_user<T: BillingTx>(
    tx: &mut T,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<UserSyncReport> {
    let mut report = UserSyncReport::default();
    let subscription = tx
        .lock_subscription_by_user(user_id)?
        .filter(|subscription| subscription.grants_access(now));

    match subscription {
        Some(subscription) => {
            report.entitlement_granted =
                ensure_publish_entitlement(tx, user_id, subscription.ends_at, None, now)?;
        }
        None => {
            let active = tx
                .latest_entitlement(user_id, EntitlementKey::CanPublishProfile)?
                .filter(|entitlement| entitlement.is_active(now));

            if let Some(entitlement) = active {
                tx.set_entitlement_expiry(entitlement.id, now, now)?;
                tx.append_audit_log(
                    InsertAuditLogEntity::new(
                        RECONCILIATION_ACTOR,
                        AuditAction::EntitlementRevoked,
                        format!("user:{user_id}"),
                    )
                    .with_reason("no active subscription")
                    .with_before(json!({ "expires_at": entitlement.expires_at }))
                    .with_after(json!({ "expires_at": now })),
                )?;
                report.entitlement_revoked = true;
            }

            report.profile_unpublished = tx.auto_unpublish_if_no_entitlement(user_id, now)?;
        }
    }

    Ok(report)
}

pub struct EntitlementSyncUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
}

impl<S> EntitlementSyncUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn sync_single_user(&self, user_id: Uuid, now: DateTime<Utc>) -> UseCaseResult<UserSyncReport> {
        self.store
            .with_transaction(|tx| sync_single_user(tx, user_id, now))
            .map_err(|err: anyhow::Error| {
                error!(%user_id, db_error = ?err, "entitlements: failed to sync user");
                EntitlementSyncError::Internal(err)
            })
    }

    /// Expires lapsed subscriptions in bulk, then reconciles every user holding a subscription
    /// or a publish entitlement, each in its own transaction. A failing user is logged and
    /// skipped so one bad row cannot stall the sweep.
    pub fn sync_all_subscriptions(&self, now: DateTime<Utc>) -> UseCaseResult<SweepReport> {
        let mut report = SweepReport::default();

        report.expired_marked = self
            .store
            .with_transaction(|tx| tx.expire_lapsed_subscriptions(now))
            .map_err(|err: anyhow::Error| {
                error!(db_error = ?err, "entitlements: failed to expire lapsed subscriptions");
                EntitlementSyncError::Internal(err)
            })?;

        let user_ids = self
            .store
            .with_transaction(|tx| tx.list_reconcilable_user_ids(EntitlementKey::CanPublishProfile))
            .map_err(|err: anyhow::Error| {
                error!(db_error = ?err, "entitlements: failed to list users to reconcile");
                EntitlementSyncError::Internal(err)
            })?;

        for user_id in user_ids {
            match self
                .store
                .with_transaction(|tx| sync_single_user(tx, user_id, now))
            {
                Ok(user_report) => report.absorb(user_report),
                Err(err) => {
                    warn!(%user_id, db_error = ?err, "entitlements: user reconciliation failed, skipping");
                    report.users_failed += 1;
                }
            }
        }

        info!(
            users_checked = report.users_checked,
            users_failed = report.users_failed,
            expired_marked = report.expired_marked,
            entitlements_granted = report.entitlements_granted,
            entitlements_revoked = report.entitlements_revoked,
            profiles_unpublished = report.profiles_unpublished,
            "entitlements: sweep finished"
        );

        Ok(report)
    }
}
