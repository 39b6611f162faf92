use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, hash_map::Entry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{Level, warn};

/// Bursts beyond this are dropped rather than blocking the logging thread.
const QUEUE_CAPACITY: usize = 256;

/// Identical alerts inside this window are counted and folded into the next one sent.
const REPEAT_WINDOW: Duration = Duration::from_secs(60);

/// Ids that locate the billing record an alert is about.
pub(crate) const CORRELATION_KEYS: [&str; 8] = [
    "provider",
    "user_id",
    "payment_id",
    "invoice_id",
    "subscription_id",
    "enrollment_id",
    "webhook_log_id",
    "session_id",
];

#[derive(Clone, Debug)]
pub(crate) struct SpanSummary {
    pub(crate) name: String,
    pub(crate) fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub(crate) struct BillingAlert {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
    pub(crate) target: String,
    pub(crate) location: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) correlation: BTreeMap<String, String>,
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) spans: Vec<SpanSummary>,
    pub(crate) suppressed_repeats: u32,
}

impl BillingAlert {
    /// Moves correlation ids out of the event fields. Ids recorded only on an enclosing
    /// span are copied from the innermost span that has them.
    pub(crate) fn collect_correlation(&mut self) {
        for key in CORRELATION_KEYS {
            if let Some(value) = self.fields.remove(key) {
                self.correlation.insert(key.to_string(), value);
                continue;
            }
            if let Some(value) = self.spans.iter().rev().find_map(|s| s.fields.get(key)) {
                self.correlation.insert(key.to_string(), value.clone());
            }
        }
    }

    // Ids are left out so a provider outage failing many payments collapses into one alert.
    fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}",
            self.level,
            self.target,
            self.message.as_deref().unwrap_or_default()
        )
    }
}

#[async_trait]
pub(crate) trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &BillingAlert) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Default)]
struct RepeatFilter {
    seen: HashMap<String, (Instant, u32)>,
}

impl RepeatFilter {
    /// `None` when the alert repeats one sent inside the window.
    fn admit(&mut self, mut alert: BillingAlert, now: Instant) -> Option<BillingAlert> {
        self.seen.retain(|_, (sent_at, suppressed)| {
            *suppressed > 0 || now.duration_since(*sent_at) < REPEAT_WINDOW
        });

        match self.seen.entry(alert.fingerprint()) {
            Entry::Occupied(mut entry) => {
                let (sent_at, suppressed) = entry.get_mut();
                if now.duration_since(*sent_at) < REPEAT_WINDOW {
                    *suppressed += 1;
                    return None;
                }
                alert.suppressed_repeats = std::mem::take(suppressed);
                *sent_at = now;
                Some(alert)
            }
            Entry::Vacant(entry) => {
                entry.insert((now, 0));
                Some(alert)
            }
        }
    }
}

#[derive(Clone)]
pub(crate) struct Notifier {
    tx: mpsc::Sender<BillingAlert>,
}

impl Notifier {
    pub(crate) fn new(sink: Arc<dyn AlertSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<BillingAlert>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            let mut filter = RepeatFilter::default();
            while let Some(alert) = rx.recv().await {
                let Some(alert) = filter.admit(alert, Instant::now()) else {
                    continue;
                };
                if let Err(error) = sink.deliver(&alert).await {
                    warn!(
                        sink = sink.name(),
                        error = %error,
                        "observability: alert delivery failed"
                    );
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn try_notify(&self, alert: BillingAlert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("observability: alert queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("observability: alert queue closed, dropping event");
            }
        }
    }
}
