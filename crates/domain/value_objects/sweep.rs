use serde::Serialize;

/// Counters accumulated by a reconciliation pass. Only `users_checked` and `users_failed` are scan counters;
/// every other field counts mutations and is zero on a pass with nothing to heal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub users_checked: u64,
    pub users_failed: u64,
    pub expired_marked: u64,
    pub entitlements_granted: u64,
    pub entitlements_revoked: u64,
    pub profiles_unpublished: u64,
}

impl SweepReport {
    pub fn absorb(&mut self, user: UserSyncReport) {
        self.users_checked += 1;
        self.entitlements_granted += u64::from(user.entitlement_granted);
        self.entitlements_revoked += u64::from(user.entitlement_revoked);
        self.profiles_unpublished += u64::from(user.profile_unpublished);
    }

    pub fn mutations(&self) -> u64 {
        self.expired_marked
            + self.entitlements_granted
            + self.entitlements_revoked
            + self.profiles_unpublished
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserSyncReport {
    pub entitlement_granted: bool,
    pub entitlement_revoked: bool,
    pub profile_unpublished: bool,
}
