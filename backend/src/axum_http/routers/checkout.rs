use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use billing_core::domain::{
    repositories::TransactionManager, value_objects::enums::payment_providers::PaymentProvider,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{axum_http::error_responses::AppError, usecases::checkout::CheckoutUseCase};

pub fn routes<S>(usecase: Arc<CheckoutUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/", post(create_checkout::<S>))
        .with_state(usecase)
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub user_id: Uuid,
    pub price_id: Uuid,
    pub provider: PaymentProvider,
    /// Resubmitting with the same key reuses the open checkout session.
    pub idempotency_key: Option<String>,
}

/// Rejections come back as `200` with `result = "rejected"` and a reason code.
pub async fn create_checkout<S>(
    State(usecase): State<Arc<CheckoutUseCase<S>>>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let outcome = usecase
        .create_checkout_session(
            request.user_id,
            request.price_id,
            request.provider,
            request.idempotency_key,
        )
        .await?;

    Ok(Json(outcome).into_response())
}
