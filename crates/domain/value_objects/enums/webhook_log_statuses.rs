use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookLogStatus {
    Received,
    Processed,
    Rejected,
    Invalid,
    Failed,
}

impl WebhookLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookLogStatus::Received => "received",
            WebhookLogStatus::Processed => "processed",
            WebhookLogStatus::Rejected => "rejected",
            WebhookLogStatus::Invalid => "invalid",
            WebhookLogStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "received" => Some(WebhookLogStatus::Received),
            "processed" => Some(WebhookLogStatus::Processed),
            "rejected" => Some(WebhookLogStatus::Rejected),
            "invalid" => Some(WebhookLogStatus::Invalid),
            "failed" => Some(WebhookLogStatus::Failed),
            _ => None,
        }
    }
}

impl Display for WebhookLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
