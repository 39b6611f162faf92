use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Due,
    Paid,
    Failed,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Due => "due",
            InstallmentStatus::Paid => "paid",
            InstallmentStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "due" => Some(InstallmentStatus::Due),
            "paid" => Some(InstallmentStatus::Paid),
            "failed" => Some(InstallmentStatus::Failed),
            _ => None,
        }
    }

    /// `failed` installments stay payable.
    pub fn is_payable(&self) -> bool {
        matches!(self, InstallmentStatus::Due | InstallmentStatus::Failed)
    }
}

impl Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    PendingPayment,
    Active,
    Canceled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::PendingPayment => "pending_payment",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending_payment" => Some(EnrollmentStatus::PendingPayment),
            "active" => Some(EnrollmentStatus::Active),
            "canceled" => Some(EnrollmentStatus::Canceled),
            _ => None,
        }
    }
}

impl Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoursePaymentMode {
    Lumpsum,
    Installments,
}

impl CoursePaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoursePaymentMode::Lumpsum => "lumpsum",
            CoursePaymentMode::Installments => "installments",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "lumpsum" => Some(CoursePaymentMode::Lumpsum),
            "installments" => Some(CoursePaymentMode::Installments),
            _ => None,
        }
    }
}

impl Display for CoursePaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SemesterStatus {
    Draft,
    Open,
    Closed,
}

impl SemesterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemesterStatus::Draft => "draft",
            SemesterStatus::Open => "open",
            SemesterStatus::Closed => "closed",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "open" => SemesterStatus::Open,
            "closed" => SemesterStatus::Closed,
            _ => SemesterStatus::Draft,
        }
    }
}

impl Display for SemesterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
