use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::post,
};
use billing_core::domain::repositories::TransactionManager;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    axum_http::{error_responses::AppError, routers::blocking},
    usecases::billing_dispatch::BillingDispatchUseCase,
};

pub fn routes<S>(usecase: Arc<BillingDispatchUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/:payment_id/apply", post(apply_paid_payment::<S>))
        .with_state(usecase)
}

/// Return-URL confirmation. Safe to hit repeatedly; effects already granted report
/// `ALREADY_GRANTED`.
pub async fn apply_paid_payment<S>(
    State(usecase): State<Arc<BillingDispatchUseCase<S>>>,
    Path(payment_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let effect = blocking(move || usecase.apply_paid_payment(payment_id, Utc::now())).await?;
    Ok(Json(effect).into_response())
}
