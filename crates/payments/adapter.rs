use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::payment_providers::PaymentProvider, webhooks::VerifiedWebhook,
};

#[derive(Debug, Clone, PartialEq)]
pub struct StartCheckoutRequest {
    pub session_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub callback_url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartCheckoutResponse {
    pub redirect_url: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum WebhookVerifyError {
    #[error("missing webhook signature")]
    MissingSignature,
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// One external payment gateway, normalized to the engine's checkout and webhook shapes.
#[automock]
#[async_trait]
pub trait PaymentProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    async fn start(&self, request: StartCheckoutRequest) -> Result<StartCheckoutResponse>;

    fn verify(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<VerifiedWebhook, WebhookVerifyError>;
}

pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    provider: PaymentProvider,
    context: &str,
) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = match resp.text().await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => "<empty response body>".to_string(),
        Err(err) => format!("<failed to read response body: {err}>"),
    };

    error!(
        %provider,
        status = %status,
        response_body = %body,
        context = %context,
        "payments: provider api request failed"
    );

    anyhow::bail!("{provider} API request failed: {context} (status {status})");
}

pub(crate) fn parse_session_id(value: &str) -> Result<Uuid, WebhookVerifyError> {
    Uuid::parse_str(value.trim())
        .map_err(|_| WebhookVerifyError::MalformedPayload(format!("unknown order id {value}")))
}
