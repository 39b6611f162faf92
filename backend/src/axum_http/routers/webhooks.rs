use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use billing_core::domain::repositories::TransactionManager;
use chrono::Utc;
use tracing::info;

use crate::{
    axum_http::{error_responses::AppError, routers::blocking},
    usecases::webhook_ingestion::WebhookIngestionUseCase,
};

pub fn routes<S>(usecase: Arc<WebhookIngestionUseCase<S>>) -> Router
where
    S: TransactionManager,
{
    Router::new()
        .route("/:provider", post(receive::<S>))
        .with_state(usecase)
}

pub async fn receive<S>(
    State(usecase): State<Arc<WebhookIngestionUseCase<S>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError>
where
    S: TransactionManager,
{
    let signature = usecase
        .signature_header(&provider)
        .and_then(|header| headers.get(header))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    info!(
        provider = %provider,
        body_bytes = body.len(),
        signed = signature.is_some(),
        "webhooks: delivery received"
    );

    let receipt = blocking(move || {
        usecase.ingest(&provider, &body, signature.as_deref(), Utc::now())
    })
    .await?;

    Ok((StatusCode::OK, Json(receipt)).into_response())
}
