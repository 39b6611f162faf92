use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::usecases::{
    billing_dispatch::DispatchError, checkout::CheckoutError, course_installments::CourseError,
    entitlement_sync::EntitlementSyncError, job_credits::JobCreditError,
    payment_recorder::PaymentRecordError, subscription_lifecycle::SubscriptionError,
    webhook_ingestion::WebhookError,
};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Operator routes are disabled")]
    OperatorDisabled,

    #[error("{message}")]
    Domain {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn domain(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        AppError::Domain {
            status,
            code,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::OperatorDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "OPERATOR_DISABLED",
                self.to_string(),
            ),
            AppError::Domain {
                status,
                code,
                message,
            } => (status, code, message),
            AppError::Internal(_) => {
                // Don't leak internal error detail to client
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

macro_rules! domain_error {
    ($($error:ty),+ $(,)?) => {
        $(
            impl From<$error> for AppError {
                fn from(value: $error) -> Self {
                    if value.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
                        return AppError::Internal(anyhow::Error::new(value));
                    }
                    AppError::domain(value.status_code(), value.code(), value)
                }
            }
        )+
    };
}

domain_error!(
    SubscriptionError,
    PaymentRecordError,
    JobCreditError,
    CourseError,
    DispatchError,
    WebhookError,
);

impl From<CheckoutError> for AppError {
    fn from(value: CheckoutError) -> Self {
        match value {
            CheckoutError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl From<EntitlementSyncError> for AppError {
    fn from(value: EntitlementSyncError) -> Self {
        match value {
            EntitlementSyncError::Internal(err) => AppError::Internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn domain_errors_keep_status_and_code() {
        let err = AppError::from(PaymentRecordError::AmountMismatch {
            expected: 100,
            actual: 1,
        });

        match err {
            AppError::Domain { status, code, .. } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(code, "AMOUNT_MISMATCH");
            }
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[test]
    fn internal_errors_are_hidden() {
        let err = AppError::from(SubscriptionError::Internal(anyhow::anyhow!(
            "connection refused to 10.0.0.3"
        )));
        assert!(matches!(err, AppError::Internal(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let not_found = AppError::from(PaymentRecordError::SessionNotFound(Uuid::nil())).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
    }
}
