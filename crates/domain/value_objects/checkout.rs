use serde::Serialize;
use uuid::Uuid;

/// User-facing reasons a checkout cannot start. Returned as data; callers map the code to
/// a localized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutRejection {
    AlreadyPaid,
    InvalidEnrollmentStatus,
    EnrollmentNotFound,
    CourseNotPublished,
    SemesterNotOpen,
    InstallmentsDisabled,
    InvalidInstallment,
    PriceNotFound,
    PriceInactive,
    ProviderUnavailable,
    ProviderTimeout,
    ProviderError,
}

impl CheckoutRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutRejection::AlreadyPaid => "ALREADY_PAID",
            CheckoutRejection::InvalidEnrollmentStatus => "INVALID_ENROLLMENT_STATUS",
            CheckoutRejection::EnrollmentNotFound => "ENROLLMENT_NOT_FOUND",
            CheckoutRejection::CourseNotPublished => "COURSE_NOT_PUBLISHED",
            CheckoutRejection::SemesterNotOpen => "SEMESTER_NOT_OPEN",
            CheckoutRejection::InstallmentsDisabled => "INSTALLMENTS_DISABLED",
            CheckoutRejection::InvalidInstallment => "INVALID_INSTALLMENT",
            CheckoutRejection::PriceNotFound => "PRICE_NOT_FOUND",
            CheckoutRejection::PriceInactive => "PRICE_INACTIVE",
            CheckoutRejection::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            CheckoutRejection::ProviderTimeout => "PROVIDER_TIMEOUT",
            CheckoutRejection::ProviderError => "PROVIDER_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Redirect {
        session_id: Uuid,
        redirect_url: String,
        reused: bool,
    },
    Rejected {
        reason: CheckoutRejection,
    },
}

impl CheckoutOutcome {
    pub fn rejected(reason: CheckoutRejection) -> Self {
        CheckoutOutcome::Rejected { reason }
    }
}
