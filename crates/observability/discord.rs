use super::notifier::{AlertSink, BillingAlert};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::Level;
use url::Url;

// Discord embed limits.
const TITLE_LIMIT: usize = 256;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_VALUE_LIMIT: usize = 1024;
const MAX_FIELDS: usize = 25;

pub(crate) struct DiscordWebhookSink {
    webhook_url: Url,
    client: Client,
}

impl DiscordWebhookSink {
    pub(crate) fn new(webhook_url: Url) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            webhook_url,
            client,
        }
    }
}

#[async_trait]
impl AlertSink for DiscordWebhookSink {
    async fn deliver(&self, alert: &BillingAlert) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "embeds": [render_embed(alert)] }))
            .send()
            .await
            .map_err(sanitize_reqwest_error)?;

        if response.status().is_success() {
            return Ok(());
        }

        Err(anyhow!(
            "discord webhook returned non-success status: {}",
            response.status()
        ))
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

/// Correlation ids go first as inline fields so the affected payment or user is visible
/// without expanding the message.
pub(crate) fn render_embed(alert: &BillingAlert) -> Value {
    let mut description = alert
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(alert.target.as_str())
        .to_string();
    if alert.suppressed_repeats > 0 {
        description.push_str(&format!(
            "\n_{} similar alert(s) suppressed in the last minute_",
            alert.suppressed_repeats
        ));
    }

    let mut fields = Vec::new();
    for (key, value) in &alert.correlation {
        fields.push(field(key, value, true));
    }
    fields.push(field("component", &alert.component, true));
    let origin = match &alert.location {
        Some(location) => format!("{} ({location})", alert.target),
        None => alert.target.clone(),
    };
    fields.push(field("origin", &origin, false));
    for (key, value) in &alert.fields {
        fields.push(field(key, value, false));
    }
    if !alert.spans.is_empty() {
        let chain = alert
            .spans
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" > ");
        fields.push(field("spans", &chain, false));
    }
    fields.truncate(MAX_FIELDS);

    json!({
        "title": clip(
            &format!("[{}] {} / {}", alert.level, alert.service_name, alert.environment),
            TITLE_LIMIT,
        ),
        "description": clip(&description, DESCRIPTION_LIMIT),
        "color": level_color(alert.level),
        "timestamp": alert.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        "fields": fields,
    })
}

fn field(name: &str, value: &str, inline: bool) -> Value {
    json!({
        "name": clip(name, TITLE_LIMIT),
        "value": clip(&format!("`{value}`"), FIELD_VALUE_LIMIT),
        "inline": inline,
    })
}

fn level_color(level: Level) -> u32 {
    match level {
        Level::ERROR => 0xE7_4C_3C,
        Level::WARN => 0xF1_C4_0F,
        _ => 0x34_98_DB,
    }
}

fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("discord webhook request timed out");
    }
    if error.is_connect() {
        return anyhow!("discord webhook connection failed");
    }
    anyhow!("discord webhook request failed")
}

fn clip(content: &str, limit: usize) -> String {
    const SUFFIX: &str = "…";

    if content.chars().count() <= limit {
        return content.to_string();
    }
    let mut clipped: String = content.chars().take(limit - 1).collect();
    clipped.push_str(SUFFIX);
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::notifier::tests::alert;

    #[test]
    fn correlation_ids_lead_the_embed() {
        let mut alert = alert("payments: failed to record outcome");
        alert.correlation.insert("payment_id".into(), "p-1".into());
        alert.correlation.insert("provider".into(), "idpay".into());
        alert.fields.insert("db_error".into(), "timeout".into());

        let embed = render_embed(&alert);
        let fields = embed["fields"].as_array().unwrap();

        assert_eq!(fields[0]["name"], "payment_id");
        assert_eq!(fields[0]["value"], "`p-1`");
        assert_eq!(fields[0]["inline"], true);
        assert_eq!(fields[1]["name"], "provider");
        assert_eq!(fields.last().unwrap()["name"], "db_error");
        assert_eq!(embed["color"], 0xE7_4C_3C);
        assert_eq!(embed["description"], "payments: failed to record outcome");
    }

    #[test]
    fn suppressed_repeats_are_mentioned() {
        let mut alert = alert("webhooks: processing failed");
        alert.suppressed_repeats = 4;

        let embed = render_embed(&alert);

        assert!(
            embed["description"]
                .as_str()
                .unwrap()
                .contains("4 similar alert(s) suppressed")
        );
    }

    #[test]
    fn oversized_values_and_field_lists_are_cut_to_discord_limits() {
        let mut alert = alert("entitlements: sweep failed");
        alert.fields.insert("db_error".into(), "x".repeat(3000));
        for i in 0..40 {
            alert.fields.insert(format!("extra_{i:02}"), i.to_string());
        }

        let embed = render_embed(&alert);
        let fields = embed["fields"].as_array().unwrap();

        assert_eq!(fields.len(), MAX_FIELDS);
        let db_error = fields.iter().find(|f| f["name"] == "db_error").unwrap();
        assert_eq!(db_error["value"].as_str().unwrap().chars().count(), FIELD_VALUE_LIMIT);
    }

    #[test]
    fn short_content_is_untouched() {
        assert_eq!(clip("ok", 10), "ok");
    }
}
