use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementKey {
    /// Time-bounded; mirrors the subscription's `ends_at`.
    CanPublishProfile,
    /// Counted; topped up by job-credit purchases.
    JobPostCredit,
}

impl EntitlementKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementKey::CanPublishProfile => "CAN_PUBLISH_PROFILE",
            EntitlementKey::JobPostCredit => "JOB_POST_CREDIT",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "CAN_PUBLISH_PROFILE" => Some(EntitlementKey::CanPublishProfile),
            "JOB_POST_CREDIT" => Some(EntitlementKey::JobPostCredit),
            _ => None,
        }
    }
}

impl Display for EntitlementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
