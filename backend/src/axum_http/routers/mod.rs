pub mod checkout;
pub mod courses;
pub mod job_credits;
pub mod operator;
pub mod payments;
pub mod subscriptions;
pub mod webhooks;

use anyhow::anyhow;

use crate::axum_http::error_responses::AppError;

/// Runs a transactional use case off the async runtime; diesel connections block.
pub(crate) async fn blocking<T, E, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AppError::Internal(anyhow!("blocking task failed: {err}")))?
        .map_err(Into::into)
}
