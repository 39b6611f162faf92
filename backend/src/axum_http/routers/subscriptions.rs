use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use billing_core::domain::repositories::TransactionManager;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    axum_http::{error_responses::AppError, routers::blocking},
    usecases::subscription_lifecycle::SubscriptionLifecycleUseCase,
};

pub fn routes<S>(usecase: Arc<SubscriptionLifecycleUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/:user_id", get(current_subscription::<S>))
        .route(
            "/:user_id/cancel-at-period-end",
            post(set_cancel_at_period_end::<S>),
        )
        .route("/:user_id/cancel", post(cancel_now::<S>))
        .with_state(usecase)
}

#[derive(Debug, Deserialize)]
pub struct CancelAtPeriodEndRequest {
    pub cancel: bool,
}

pub async fn current_subscription<S>(
    State(usecase): State<Arc<SubscriptionLifecycleUseCase<S>>>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let subscription = blocking(move || usecase.current_subscription(user_id)).await?;
    Ok(Json(subscription).into_response())
}

pub async fn set_cancel_at_period_end<S>(
    State(usecase): State<Arc<SubscriptionLifecycleUseCase<S>>>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CancelAtPeriodEndRequest>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let subscription = blocking(move || {
        usecase.set_cancel_at_period_end(user_id, request.cancel, Utc::now())
    })
    .await?;
    Ok(Json(subscription).into_response())
}

pub async fn cancel_now<S>(
    State(usecase): State<Arc<SubscriptionLifecycleUseCase<S>>>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let subscription = blocking(move || usecase.cancel_now(user_id, Utc::now())).await?;
    Ok(Json(subscription).into_response())
}
