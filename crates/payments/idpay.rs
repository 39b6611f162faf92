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

pub const DEFAULT_API_BASE: &str = "https://api.idpay.ir";

/// 100 verified, 101 already verified, 200 settled. Everything else is a failure.
const PAID_STATUSES: [i32; 3] = [100, 101, 200];

pub struct IdPayAdapter {
    http: reqwest::Client,
    api_key: String,
    webhook_secret: String,
    api_base: String,
    sandbox: bool,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    order_id: String,
    amount: i64,
    callback: &'a str,
    desc: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    link: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IdPayWebhook {
    pub id: String,
    pub order_id: String,
    pub status: i32,
    pub amount: i64,
    #[serde(default)]
    pub track_id: Option<String>,
}

impl IdPayAdapter {
    pub fn new(
        api_key: String,
        webhook_secret: String,
        api_base: Option<String>,
        sandbox: bool,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            webhook_secret,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            sandbox,
        }
    }
}

#[async_trait]
impl PaymentProviderAdapter for IdPayAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::IdPay
    }

    fn signature_header(&self) -> &'static str {
        "x-idpay-signature"
    }

    async fn start(&self, request: StartCheckoutRequest) -> Result<StartCheckoutResponse> {
        let body = CreatePaymentBody {
            order_id: request.session_id.to_string(),
            amount: request.amount,
            callback: &request.callback_url,
            desc: &request.description,
        };

        let resp = self
            .http
            .post(format!("{}/v1.1/payment", self.api_base))
            .header("X-API-KEY", &self.api_key)
            .header("X-SANDBOX", if self.sandbox { "1" } else { "0" })
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(resp, self.provider(), "create payment").await?;

        let parsed: CreatePaymentResponse = resp.json().await?;
        Ok(StartCheckoutResponse {
            redirect_url: parsed.link,
        })
    }

    fn verify(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<VerifiedWebhook, WebhookVerifyError> {
        let provided = signature
            .trim()
            .strip_prefix("sha256=")
            .ok_or(WebhookVerifyError::MissingSignature)?;
        if !signature::verify_hex(&self.webhook_secret, raw_body, provided) {
            return Err(WebhookVerifyError::InvalidSignature);
        }

        let event: IdPayWebhook = serde_json::from_slice(raw_body)
            .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;
        let payload = serde_json::to_value(&event)
            .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;

        let outcome = if PAID_STATUSES.contains(&event.status) {
            PaymentOutcome::Paid
        } else {
            PaymentOutcome::Failed
        };

        Ok(VerifiedWebhook {
            external_id: format!("{}:{}", event.id, event.status),
            session_id: parse_session_id(&event.order_id)?,
            provider_transaction_id: event.track_id.unwrap_or(event.id),
            outcome,
            amount: event.amount,
            payload,
        })
    }
}
