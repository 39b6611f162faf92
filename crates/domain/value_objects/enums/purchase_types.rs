use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Tag stored on a checkout session; decides which domain effect a paid payment triggers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseType {
    Subscription,
    JobCredit,
    CourseSemester,
}

impl PurchaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseType::Subscription => "subscription",
            PurchaseType::JobCredit => "job_credit",
            PurchaseType::CourseSemester => "course_semester",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "subscription" => Some(PurchaseType::Subscription),
            "job_credit" => Some(PurchaseType::JobCredit),
            "course_semester" => Some(PurchaseType::CourseSemester),
            _ => None,
        }
    }
}

impl Display for PurchaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Subscription,
    JobCredit,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Subscription => "subscription",
            ProductType::JobCredit => "job_credit",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "subscription" => Some(ProductType::Subscription),
            "job_credit" => Some(ProductType::JobCredit),
            _ => None,
        }
    }

    pub fn purchase_type(&self) -> PurchaseType {
        match self {
            ProductType::Subscription => PurchaseType::Subscription,
            ProductType::JobCredit => PurchaseType::JobCredit,
        }
    }
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
