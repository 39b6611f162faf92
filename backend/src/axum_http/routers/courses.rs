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
    usecases::course_installments::{CourseCheckoutRequest, CourseInstallmentsUseCase},
};

pub fn routes<S>(usecase: Arc<CourseInstallmentsUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/checkout", post(create_course_checkout::<S>))
        .route("/:enrollment_id/plan", get(installment_plan::<S>))
        .route("/:enrollment_id/next-installment", get(next_installment::<S>))
        .with_state(usecase)
}

/// Pricing preview, mounted separately so it does not collide with the enrollment routes.
pub fn semester_routes<S>(usecase: Arc<CourseInstallmentsUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/:semester_id/quote", get(quote::<S>))
        .with_state(usecase)
}

pub async fn create_course_checkout<S>(
    State(usecase): State<Arc<CourseInstallmentsUseCase<S>>>,
    Json(request): Json<CourseCheckoutRequest>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let outcome = usecase
        .create_course_checkout_session(request, Utc::now())
        .await?;
    Ok(Json(outcome).into_response())
}

pub async fn installment_plan<S>(
    State(usecase): State<Arc<CourseInstallmentsUseCase<S>>>,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let plan = blocking(move || usecase.ensure_installment_plan(enrollment_id, Utc::now())).await?;
    Ok(Json(plan).into_response())
}

/// `null` once the enrollment is fully paid.
pub async fn next_installment<S>(
    State(usecase): State<Arc<CourseInstallmentsUseCase<S>>>,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let next = blocking(move || {
        usecase.compute_next_installment_to_pay(enrollment_id, Utc::now())
    })
    .await?;
    Ok(Json(next).into_response())
}

pub async fn quote<S>(
    State(usecase): State<Arc<CourseInstallmentsUseCase<S>>>,
    Path(semester_id): Path<Uuid>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let breakdown = blocking(move || usecase.quote(semester_id)).await?;
    Ok(Json(breakdown).into_response())
}
