use std::time::Duration;

use anyhow::{Context, Result};

use super::config_model::{
    BackendServer, Checkout, Database, DotEnvyConfig, IdPay, Operator, PayPing, Providers,
    Zarinpal,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
    };

    let checkout = Checkout {
        callback_base_url: required("CHECKOUT_CALLBACK_BASE_URL")?,
        provider_start_timeout: Duration::from_secs(
            std::env::var("PROVIDER_START_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("PROVIDER_START_TIMEOUT_SECS is invalid")?,
        ),
    };

    let operator = Operator {
        token: optional("OPERATOR_TOKEN"),
    };

    let zarinpal = match (
        optional("ZARINPAL_MERCHANT_ID"),
        optional("ZARINPAL_WEBHOOK_SECRET"),
    ) {
        (Some(merchant_id), Some(webhook_secret)) => Some(Zarinpal {
            merchant_id,
            webhook_secret,
            api_base: optional("ZARINPAL_API_BASE"),
            gateway_base: optional("ZARINPAL_GATEWAY_BASE"),
        }),
        _ => None,
    };

    let idpay = match (optional("IDPAY_API_KEY"), optional("IDPAY_WEBHOOK_SECRET")) {
        (Some(api_key), Some(webhook_secret)) => Some(IdPay {
            api_key,
            webhook_secret,
            api_base: optional("IDPAY_API_BASE"),
            sandbox: optional("IDPAY_SANDBOX")
                .map(|v| v.parse::<bool>())
                .transpose()
                .context("IDPAY_SANDBOX is invalid")?
                .unwrap_or(false),
        }),
        _ => None,
    };

    let payping = match (optional("PAYPING_TOKEN"), optional("PAYPING_WEBHOOK_SECRET")) {
        (Some(token), Some(webhook_secret)) => Some(PayPing {
            token,
            webhook_secret,
            api_base: optional("PAYPING_API_BASE"),
        }),
        _ => None,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        checkout,
        operator,
        providers: Providers {
            zarinpal,
            idpay,
            payping,
        },
    })
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} is invalid"))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}
