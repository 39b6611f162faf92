use serde::{Deserialize, Serialize};

/// Limits attached to a subscription plan. Stored as JSONB in the database.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlanLimits {
    #[serde(default)]
    pub max_job_applications_per_month: Option<i32>,

    #[serde(default)]
    pub max_portfolio_items: Option<i32>,

    #[serde(default)]
    pub featured_profile: Option<bool>,
}

impl PlanLimits {
    pub fn max_job_applications_or_default(&self) -> i32 {
        self.max_job_applications_per_month.unwrap_or(0)
    }

    pub fn max_portfolio_items_or_default(&self) -> i32 {
        self.max_portfolio_items.unwrap_or(5)
    }

    pub fn has_featured_profile(&self) -> bool {
        self.featured_profile.unwrap_or(false)
    }
}

/// Per-price metadata. Stored as JSONB in the database.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PriceMetadata {
    /// Credits granted by a flat job-credit price.
    #[serde(default)]
    pub job_post_credits: Option<i32>,

    #[serde(default)]
    pub label: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_and_missing_fields_fall_back_to_defaults() {
        let limits: PlanLimits =
            serde_json::from_value(serde_json::json!({ "featured_profile": true, "legacy": 1 }))
                .unwrap();
        assert!(limits.has_featured_profile());
        assert_eq!(limits.max_portfolio_items_or_default(), 5);

        let metadata: PriceMetadata =
            serde_json::from_value(serde_json::json!({ "job_post_credits": 10 })).unwrap();
        assert_eq!(metadata.job_post_credits, Some(10));
    }
}
