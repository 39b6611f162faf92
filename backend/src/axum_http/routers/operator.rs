use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};
use billing_core::domain::repositories::TransactionManager;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    axum_http::{error_responses::AppError, routers::blocking},
    usecases::{entitlement_sync::EntitlementSyncUseCase, payment_recorder::PaymentRecorderUseCase},
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_BACKEND/internal/v1/reconciliation/run" \
//     -H "Authorization: Bearer $OPERATOR_TOKEN"

pub struct OperatorRouteState<S>
where
    S: TransactionManager,
{
    pub token: Option<String>,
    pub entitlement_sync: Arc<EntitlementSyncUseCase<S>>,
    pub payment_recorder: Arc<PaymentRecorderUseCase<S>>,
}

impl<S> Clone for OperatorRouteState<S>
where
    S: TransactionManager,
{
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            entitlement_sync: Arc::clone(&self.entitlement_sync),
            payment_recorder: Arc::clone(&self.payment_recorder),
        }
    }
}

pub fn routes<S>(state: OperatorRouteState<S>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/reconciliation/run", post(run_reconciliation::<S>))
        .route("/reconciliation/users/:user_id", post(sync_user::<S>))
        .route("/payments/:payment_id/refund", post(refund_payment::<S>))
        .route("/invoices/:invoice_id/void", post(void_invoice::<S>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct OperatorActionRequest {
    /// Recorded on the audit entry.
    pub actor: String,
    pub reason: Option<String>,
}

pub async fn run_reconciliation<S>(
    State(state): State<OperatorRouteState<S>>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    authorize(&state, &headers)?;
    let usecase = Arc::clone(&state.entitlement_sync);
    let report = blocking(move || usecase.sync_all_subscriptions(Utc::now())).await?;
    info!(?report, "operator: reconciliation run finished");
    Ok(Json(report).into_response())
}

pub async fn sync_user<S>(
    State(state): State<OperatorRouteState<S>>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    authorize(&state, &headers)?;
    let usecase = Arc::clone(&state.entitlement_sync);
    let report = blocking(move || usecase.sync_single_user(user_id, Utc::now())).await?;
    Ok(Json(report).into_response())
}

pub async fn refund_payment<S>(
    State(state): State<OperatorRouteState<S>>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<OperatorActionRequest>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    authorize(&state, &headers)?;
    let usecase = Arc::clone(&state.payment_recorder);
    let payment = blocking(move || {
        usecase.refund_payment(payment_id, &request.actor, request.reason, Utc::now())
    })
    .await?;
    Ok(Json(payment).into_response())
}

pub async fn void_invoice<S>(
    State(state): State<OperatorRouteState<S>>,
    headers: HeaderMap,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<OperatorActionRequest>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    authorize(&state, &headers)?;
    let usecase = Arc::clone(&state.payment_recorder);
    let invoice = blocking(move || {
        usecase.void_invoice(invoice_id, &request.actor, request.reason, Utc::now())
    })
    .await?;
    Ok(Json(invoice).into_response())
}

fn authorize<S>(state: &OperatorRouteState<S>, headers: &HeaderMap) -> Result<(), AppError>
where
    S: TransactionManager,
{
    let expected_token = state.token.as_deref().ok_or(AppError::OperatorDisabled)?;
    authorize_bearer(headers, expected_token).inspect_err(|_| {
        warn!("operator: rejected request with missing or wrong bearer token");
    })
}

fn authorize_bearer(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    if token == expected_token {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_must_match() {
        assert!(authorize_bearer(&headers("Bearer s3cret"), "s3cret").is_ok());
        assert!(matches!(
            authorize_bearer(&headers("Bearer nope"), "s3cret"),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authorize_bearer(&headers("s3cret"), "s3cret"),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authorize_bearer(&HeaderMap::new(), "s3cret"),
            Err(AppError::Unauthorized)
        ));
    }
}
