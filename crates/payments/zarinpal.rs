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

pub const DEFAULT_API_BASE: &str = "https://api.zarinpal.com";
pub const DEFAULT_GATEWAY_BASE: &str = "https://www.zarinpal.com";

pub struct ZarinpalAdapter {
    http: reqwest::Client,
    merchant_id: String,
    webhook_secret: String,
    api_base: String,
    gateway_base: String,
}

#[derive(Debug, Serialize)]
struct PaymentRequestBody<'a> {
    merchant_id: &'a str,
    amount: i64,
    currency: &'a str,
    callback_url: &'a str,
    description: &'a str,
    metadata: PaymentRequestMetadata,
}

#[derive(Debug, Serialize)]
struct PaymentRequestMetadata {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentRequestResponse {
    data: Option<PaymentRequestData>,
}

#[derive(Debug, Deserialize)]
struct PaymentRequestData {
    code: i32,
    authority: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ZarinpalWebhook {
    pub authority: String,
    /// `OK` or `NOK`.
    pub status: String,
    pub amount: i64,
    pub order_id: String,
    #[serde(default)]
    pub ref_id: Option<String>,
}

impl ZarinpalAdapter {
    pub fn new(
        merchant_id: String,
        webhook_secret: String,
        api_base: Option<String>,
        gateway_base: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            merchant_id,
            webhook_secret,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            gateway_base: gateway_base.unwrap_or_else(|| DEFAULT_GATEWAY_BASE.to_string()),
        }
    }
}

#[async_trait]
impl PaymentProviderAdapter for ZarinpalAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Zarinpal
    }

    fn signature_header(&self) -> &'static str {
        "x-zarinpal-signature"
    }

    async fn start(&self, request: StartCheckoutRequest) -> Result<StartCheckoutResponse> {
        let body = PaymentRequestBody {
            merchant_id: &self.merchant_id,
            amount: request.amount,
            currency: &request.currency,
            callback_url: &request.callback_url,
            description: &request.description,
            metadata: PaymentRequestMetadata {
                order_id: request.session_id.to_string(),
            },
        };

        let resp = self
            .http
            .post(format!("{}/pg/v4/payment/request.json", self.api_base))
            .json(&body)
            .send()
            .await?;
        let resp = ensure_success(resp, self.provider(), "payment request").await?;

        let parsed: PaymentRequestResponse = resp.json().await?;
        let data = parsed
            .data
            .ok_or_else(|| anyhow::anyhow!("zarinpal payment request returned no data"))?;
        if data.code != 100 {
            anyhow::bail!("zarinpal payment request rejected with code {}", data.code);
        }

        Ok(StartCheckoutResponse {
            redirect_url: format!("{}/pg/StartPay/{}", self.gateway_base, data.authority),
        })
    }

    fn verify(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<VerifiedWebhook, WebhookVerifyError> {
        if signature.trim().is_empty() {
            return Err(WebhookVerifyError::MissingSignature);
        }
        if !signature::verify_hex(&self.webhook_secret, raw_body, signature) {
            return Err(WebhookVerifyError::InvalidSignature);
        }

        let event: ZarinpalWebhook = serde_json::from_slice(raw_body)
            .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;
        let payload = serde_json::to_value(&event)
            .map_err(|err| WebhookVerifyError::MalformedPayload(err.to_string()))?;

        let outcome = if event.status.eq_ignore_ascii_case("OK") {
            PaymentOutcome::Paid
        } else {
            PaymentOutcome::Failed
        };

        Ok(VerifiedWebhook {
            external_id: format!("{}:{}", event.authority, event.status.to_ascii_uppercase()),
            session_id: parse_session_id(&event.order_id)?,
            provider_transaction_id: event.ref_id.unwrap_or(event.authority),
            outcome,
            amount: event.amount,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn adapter() -> ZarinpalAdapter {
        ZarinpalAdapter::new("merchant".to_string(), "zp-secret".to_string(), None, None)
    }

    #[test]
    fn verify_normalizes_paid_callback() {
        let session_id = Uuid::new_v4();
        let body = serde_json::json!({
            "authority": "A000123",
            "status": "OK",
            "amount": 5_000_000,
            "order_id": session_id.to_string(),
            "ref_id": "98765",
        })
        .to_string();
        let signature = signature::sign_hex("zp-secret", body.as_bytes()).unwrap();

        let verified = adapter().verify(body.as_bytes(), &signature).unwrap();

        assert_eq!(verified.session_id, session_id);
        assert_eq!(verified.external_id, "A000123:OK");
        assert_eq!(verified.provider_transaction_id, "98765");
        assert_eq!(verified.outcome, PaymentOutcome::Paid);
        assert_eq!(verified.amount, 5_000_000);
    }

    #[test]
    fn verify_rejects_bad_signature_before_parsing() {
        let result = adapter().verify(b"not json", "deadbeef");
        assert_eq!(result.unwrap_err(), WebhookVerifyError::InvalidSignature);

        let result = adapter().verify(b"{}", "  ");
        assert_eq!(result.unwrap_err(), WebhookVerifyError::MissingSignature);
    }

    #[test]
    fn nok_status_is_a_failed_outcome() {
        let body = serde_json::json!({
            "authority": "A000124",
            "status": "NOK",
            "amount": 5_000_000,
            "order_id": Uuid::new_v4().to_string(),
        })
        .to_string();
        let signature = signature::sign_hex("zp-secret", body.as_bytes()).unwrap();

        let verified = adapter().verify(body.as_bytes(), &signature).unwrap();

        assert_eq!(verified.outcome, PaymentOutcome::Failed);
        assert_eq!(verified.provider_transaction_id, "A000124");
    }
}
