use std::{sync::Arc, time::Duration};

use billing_core::payments::{
    idpay::IdPayAdapter, payping::PayPingAdapter, registry::ProviderRegistry,
    zarinpal::ZarinpalAdapter,
};

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub checkout: Checkout,
    pub operator: Operator,
    pub providers: Providers,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Checkout {
    pub callback_base_url: String,
    pub provider_start_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Operator {
    /// Operator routes answer 503 while unset.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Zarinpal {
    pub merchant_id: String,
    pub webhook_secret: String,
    pub api_base: Option<String>,
    pub gateway_base: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IdPay {
    pub api_key: String,
    pub webhook_secret: String,
    pub api_base: Option<String>,
    pub sandbox: bool,
}

#[derive(Debug, Clone)]
pub struct PayPing {
    pub token: String,
    pub webhook_secret: String,
    pub api_base: Option<String>,
}

/// A provider is configured only when all of its credentials are present.
#[derive(Debug, Clone, Default)]
pub struct Providers {
    pub zarinpal: Option<Zarinpal>,
    pub idpay: Option<IdPay>,
    pub payping: Option<PayPing>,
}

impl Providers {
    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();

        if let Some(zarinpal) = &self.zarinpal {
            registry = registry.register(Arc::new(ZarinpalAdapter::new(
                zarinpal.merchant_id.clone(),
                zarinpal.webhook_secret.clone(),
                zarinpal.api_base.clone(),
                zarinpal.gateway_base.clone(),
            )));
        }
        if let Some(idpay) = &self.idpay {
            registry = registry.register(Arc::new(IdPayAdapter::new(
                idpay.api_key.clone(),
                idpay.webhook_secret.clone(),
                idpay.api_base.clone(),
                idpay.sandbox,
            )));
        }
        if let Some(payping) = &self.payping {
            registry = registry.register(Arc::new(PayPingAdapter::new(
                payping.token.clone(),
                payping.webhook_secret.clone(),
                payping.api_base.clone(),
            )));
        }

        registry
    }
}
