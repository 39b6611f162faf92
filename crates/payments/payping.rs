use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    adapter::{
        PaymentProviderAdapter, StartCheckoutRequest, StartCheckoutResponse, WebhookVerifyError,
        ensure_success, parse_session_id,
    },
    signature,
};
use crate::domain::value_objects::{
    enums::payment_providers::PaymentProvider,
    webhooks::{PaymentOutcome, VerifiedWebhook},
};

pub const DEFAULT_API_BASE: &str = "https://api.payping.ir";

pub struct PayPingAdapter {
    http: reqwest::Client,
    token: String,
    webhook_secret: String,
    api_base: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayBody<'a> {
    amount: i64,
    return_url: &'a str,
    client_ref_id: String,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePayResponse {
    code: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PayPingWebhook {
    pub refid: String,
    pub clientrefid: String,
    pub amount: i64,
    /// `paid` or `failed`.
    pub status: String,
}

impl PayPingAdapter {
    pub fn new(token: String, webhook_secret: String, api_base: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            webhook_secret,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }
}

#[async_trait]
impl PaymentProviderAdapter for PayPingAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::PayPing
    }

    fn signature_header(&self) -> &'static str {
        "x-payping-signature"
    }

    async fn start(&self, request: StartCheckoutRequest) -> Result<StartCheckoutResponse> {
        let body = CreatePayBody {
            amount: request.amount,
            return_url: &request.callback_url,
            client_ref_id: request.session_id.to_string(),
            description: &request.description,
        };

        let resp = self
            .http
            .post(format!("{}/v2/pay", self.api_base))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(resp, self.provider(), "create pay").await?;

        let parsed: CreatePayResponse = resp.json().await?;
        Ok(StartCheckoutResponse {
            redirect_url: format!("{}/v2/pay/gotoipg/{}", self.api_base, parsed.code),
        })
    }

    fn verify(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<VerifiedWebhook, WebhookVerifyError> {
        let (timestamp, provided) = signature::parse_timestamped_header(signature)
            .ok_or(WebhookVerifyError::MissingSignature)?;

        let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + raw_body.len());
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(raw_body);
        if !signature::verify_hex(&self.webhook_secret, &signed_payload, &provided) {
            return Err(WebhookVerifyError::InvalidSignature);
        }

        let event: PayPingWebhook = serde_json::from_slice(raw_body)
            .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;
        let payload = serde_json::to_value(&event)
            .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;

        let outcome = if event.status.eq_ignore_ascii_case("paid") {
            PaymentOutcome::Paid
        } else {
            PaymentOutcome::Failed
        };

        Ok(VerifiedWebhook {
            external_id: format!("{}:{}", event.refid, event.status.to_ascii_lowercase()),
            session_id: parse_session_id(&event.clientrefid)?,
            provider_transaction_id: event.refid,
            outcome,
            amount: event.amount,
            payload,
        })
    }
}
