use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use billing_core::domain::repositories::TransactionManager;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    axum_http::{error_responses::AppError, routers::blocking},
    usecases::job_credits::JobCreditUseCase,
};

pub fn routes<S>(usecase: Arc<JobCreditUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/:user_id", get(balance::<S>))
        .route("/:user_id/consume", post(consume::<S>))
        .with_state(usecase)
}

pub async fn balance<S>(
    State(usecase): State<Arc<JobCreditUseCase<S>>>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let balance = blocking(move || usecase.balance(user_id)).await?;
    Ok(Json(balance).into_response())
}

/// `402 NO_CREDITS` when the balance is already zero.
pub async fn consume<S>(
    State(usecase): State<Arc<JobCreditUseCase<S>>>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let balance = blocking(move || usecase.consume_job_credit(user_id, Utc::now())).await?;
    Ok(Json(balance).into_response())
}
