use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Zarinpal,
    IdPay,
    PayPing,
}

impl PaymentProvider {
    pub const ALL: [PaymentProvider; 3] = [
        PaymentProvider::Zarinpal,
        PaymentProvider::IdPay,
        PaymentProvider::PayPing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Zarinpal => "zarinpal",
            PaymentProvider::IdPay => "idpay",
            PaymentProvider::PayPing => "payping",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zarinpal" => Some(PaymentProvider::Zarinpal),
            "idpay" => Some(PaymentProvider::IdPay),
            "payping" => Some(PaymentProvider::PayPing),
            _ => None,
        }
    }
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
