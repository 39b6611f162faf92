use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::billing::DispatchEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Paid,
    Failed,
}

/// Provider-neutral shape every adapter normalizes a verified webhook into.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedWebhook {
    /// Deduplication key within the provider, usually the provider's transaction id.
    pub external_id: String,
    pub session_id: Uuid,
    pub provider_transaction_id: String,
    pub outcome: PaymentOutcome,
    pub amount: i64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookReceipt {
    pub idempotent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<DispatchEffect>,
}

impl WebhookReceipt {
    pub fn replay() -> Self {
        Self {
            idempotent: true,
            payment_id: None,
            effect: None,
        }
    }
}
