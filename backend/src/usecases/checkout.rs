use std::{sync::Arc, time::Duration};
use billing_core::domain::repositories::{catalog::CatalogRepository, checkout_sessions::CheckoutSessionRepository};

use anyhow::Context;
use billing_core::{
    domain::{
        entities::checkout_sessions::{CheckoutSessionEntity, InsertCheckoutSessionEntity},
        repositories::{BillingTx, TransactionManager},
        value_objects::{
            checkout::{CheckoutOutcome, CheckoutRejection},
            enums::{payment_providers::PaymentProvider, payment_statuses::PaymentStatus},
        },
    },
    payments::{
        adapter::{PaymentProviderAdapter, StartCheckoutRequest, StartCheckoutResponse},
        registry::ProviderRegistry,
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CheckoutError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        axum::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

pub type UseCaseResult<T> = std::result::Result<T, CheckoutError>;

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Where the provider sends the user back; the session id is appended as a query parameter.
    pub return_url: String,
    pub provider_timeout: Duration,
}

/// A checkout session that is ready to be sent to its provider, or the reason it cannot be.
pub(crate) enum PreparedCheckout {
    Ready {
        session: CheckoutSessionEntity,
        reused: bool,
        description: String,
    },
    Rejected(CheckoutRejection),
}

/// Inserts the session, or returns the one already holding `idempotency_key`. A session
/// whose payment failed is spent: the retry moves to a key chained off that session, so a
/// second failure chains again and concurrent retries still meet on one row.
pub(crate) fn open_or_reuse_session<T: BillingTx>(
    tx: &mut T,
    mut session: InsertCheckoutSessionEntity,
) -> anyhow::Result<(CheckoutSessionEntity, bool)> {
    let base_key = session.idempotency_key.clone();
    while let Some(existing) = tx.find_checkout_session_by_idempotency_key(&session.idempotency_key)? {
        if !payment_failed(tx, &existing)? {
            return Ok((existing, true));
        }
        info!(session_id = %existing.id, "checkout: previous attempt failed, opening a new session");
        session.idempotency_key = retry_idempotency_key(&base_key, existing.id);
    }

    let idempotency_key = session.idempotency_key.clone();
    match tx.insert_checkout_session(session)? {
        Some(inserted) => Ok((inserted, false)),
        None => {
            let winner = tx
                .find_checkout_session_by_idempotency_key(&idempotency_key)?
                .context("checkout session vanished after insert conflict")?;
            Ok((winner, true))
        }
    }
}

fn payment_failed<T: BillingTx>(tx: &mut T, session: &CheckoutSessionEntity) -> anyhow::Result<bool> {
    let payment = tx.lock_payment_by_provider_ref(&session.provider, &session.provider_ref())?;
    Ok(payment.is_some_and(|payment| payment.status() == Some(PaymentStatus::Failed)))
}

fn retry_idempotency_key(base_key: &str, failed_session_id: Uuid) -> String {
    format!("{base_key}:after:{failed_session_id}")
}

pub(crate) fn callback_url(return_url: &str, session_id: Uuid) -> anyhow::Result<String> {
    let mut url = Url::parse(return_url).context("invalid checkout return url")?;
    url.query_pairs_mut()
        .append_pair("session_id", &session_id.to_string());
    Ok(url.into())
}

/// Asks the provider for a redirect and stamps it on the session. A session that already has
/// a redirect is returned as-is; when two callers race, the first stamped redirect wins.
pub(crate) async fn issue_redirect<S>(
    store: &S,
    registry: &ProviderRegistry,
    prepared: PreparedCheckout,
    timeout: Duration,
) -> UseCaseResult<CheckoutOutcome>
where
    S: TransactionManager,
{
    let (session, reused, description) = match prepared {
        PreparedCheckout::Rejected(reason) => return Ok(CheckoutOutcome::rejected(reason)),
        PreparedCheckout::Ready {
            session,
            reused,
            description,
        } => (session, reused, description),
    };

    if let Some(redirect_url) = session.redirect_url.clone() {
        info!(session_id = %session.id, "checkout: reusing existing redirect");
        return Ok(CheckoutOutcome::Redirect {
            session_id: session.id,
            redirect_url,
            reused: true,
        });
    }

    let Some(adapter) = session.provider().and_then(|provider| registry.get(provider)) else {
        warn!(session_id = %session.id, provider = %session.provider, "checkout: provider not configured");
        return Ok(CheckoutOutcome::rejected(CheckoutRejection::ProviderUnavailable));
    };

    let request = StartCheckoutRequest {
        session_id: session.id,
        amount: session.amount,
        currency: session.currency.clone(),
        callback_url: callback_url(&session.return_url, session.id)?,
        description,
    };

    let response = match start_with_timeout(adapter.as_ref(), request, timeout).await {
        Ok(response) => response,
        Err(reason) => {
            // The session stays open; a retry with the same key reuses it.
            return Ok(CheckoutOutcome::rejected(reason));
        }
    };

    let stored = store
        .with_transaction(|tx| tx.set_checkout_redirect_url(session.id, &response.redirect_url))
        .map_err(|err: anyhow::Error| {
            error!(session_id = %session.id, db_error = ?err, "checkout: failed to store redirect");
            CheckoutError::Internal(err)
        })?;
    let redirect_url = stored
        .redirect_url
        .context("checkout session has no redirect after stamping")?;

    info!(session_id = %session.id, provider = %session.provider, reused, "checkout: redirect issued");

    Ok(CheckoutOutcome::Redirect {
        session_id: session.id,
        redirect_url,
        reused,
    })
}

async fn start_with_timeout(
    adapter: &dyn PaymentProviderAdapter,
    request: StartCheckoutRequest,
    timeout: Duration,
) -> Result<StartCheckoutResponse, CheckoutRejection> {
    let session_id = request.session_id;
    let provider = adapter.provider();

    match tokio::time::timeout(timeout, adapter.start(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => {
            error!(%session_id, %provider, error = ?err, "checkout: provider rejected start request");
            Err(CheckoutRejection::ProviderError)
        }
        Err(_) => {
            warn!(%session_id, %provider, timeout_ms = timeout.as_millis() as u64, "checkout: provider timed out");
            Err(CheckoutRejection::ProviderTimeout)
        }
    }
}

pub struct CheckoutUseCase<S>
where
    S: TransactionManager,
{
    store: Arc<S>,
    registry: ProviderRegistry,
    settings: CheckoutSettings,
}

impl<S> CheckoutUseCase<S>
where
    S: TransactionManager,
{
    pub fn new(store: Arc<S>, registry: ProviderRegistry, settings: CheckoutSettings) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Opens (or reuses) a checkout session for a catalog price and returns the provider
    /// redirect. Without a client key every call is a fresh attempt.
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        price_id: Uuid,
        provider: PaymentProvider,
        client_key: Option<String>,
    ) -> UseCaseResult<CheckoutOutcome> {
        if self.registry.get(provider).is_none() {
            warn!(%user_id, %provider, "checkout: provider not configured");
            return Ok(CheckoutOutcome::rejected(CheckoutRejection::ProviderUnavailable));
        }

        let idempotency_key = match client_key {
            Some(key) => format!("client:{user_id}:{price_id}:{provider}:{key}"),
            None => format!("checkout:{}", Uuid::new_v4()),
        };
        let return_url = self.settings.return_url.clone();

        let prepared = self
            .store
            .with_transaction(|tx| -> anyhow::Result<PreparedCheckout> {
                let Some(price) = tx.find_price(price_id)? else {
                    return Ok(PreparedCheckout::Rejected(CheckoutRejection::PriceNotFound));
                };
                let Some(product) = tx.find_product(price.product_id)? else {
                    return Ok(PreparedCheckout::Rejected(CheckoutRejection::PriceNotFound));
                };
                if !price.is_active || !product.is_active {
                    return Ok(PreparedCheckout::Rejected(CheckoutRejection::PriceInactive));
                }
                let purchase_type = product
                    .product_type()
                    .with_context(|| format!("product {} has unknown type", product.id))?
                    .purchase_type();

                let description = price
                    .metadata
                    .label
                    .clone()
                    .unwrap_or_else(|| product.name.clone());

                let (session, reused) = open_or_reuse_session(
                    tx,
                    InsertCheckoutSessionEntity {
                        user_id,
                        provider: provider.to_string(),
                        price_id: Some(price.id),
                        purchase_type: purchase_type.to_string(),
                        enrollment_id: None,
                        installment_index: None,
                        amount: price.amount,
                        currency: price.currency.clone(),
                        idempotency_key,
                        return_url,
                    },
                )?;

                Ok(PreparedCheckout::Ready {
                    session,
                    reused,
                    description,
                })
            })
            .map_err(|err| {
                error!(%user_id, %price_id, db_error = ?err, "checkout: failed to open session");
                CheckoutError::Internal(err)
            })?;

        issue_redirect(
            self.store.as_ref(),
            &self.registry,
            prepared,
            self.settings.provider_timeout,
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use billing_core::{
        domain::value_objects::{
            enums::plan_cycles::PlanCycle, webhooks::VerifiedWebhook,
        },
        infra::memory::InMemoryBillingStore,
        payments::adapter::{MockPaymentProviderAdapter, WebhookVerifyError},
    };
    use mockall::predicate::function;

    pub(crate) fn settings() -> CheckoutSettings {
        CheckoutSettings {
            return_url: "https://app.test/billing/return".to_string(),
            provider_timeout: Duration::from_secs(2),
        }
    }

    pub(crate) fn redirecting_adapter(provider: PaymentProvider, times: usize) -> MockPaymentProviderAdapter {
        let mut adapter = MockPaymentProviderAdapter::new();
        adapter.expect_provider().return_const(provider);
        adapter
            .expect_start()
            .with(function(|request: &StartCheckoutRequest| {
                request.callback_url.contains("session_id=")
            }))
            .times(times)
            .returning(|request| {
                Ok(StartCheckoutResponse {
                    redirect_url: format!("https://pay.test/start/{}", request.session_id),
                })
            });
        adapter
    }

    struct StalledAdapter;

    #[async_trait]
    impl PaymentProviderAdapter for StalledAdapter {
        fn provider(&self) -> PaymentProvider {
            PaymentProvider::PayPing
        }

        fn signature_header(&self) -> &'static str {
            "x-payping-signature"
        }

        async fn start(
            &self,
            _request: StartCheckoutRequest,
        ) -> anyhow::Result<StartCheckoutResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(anyhow!("unreachable"))
        }

        fn verify(&self, _raw_body: &[u8], _signature: &str) -> Result<VerifiedWebhook, WebhookVerifyError> {
            Err(WebhookVerifyError::InvalidSignature)
        }
    }

    #[tokio::test]
    async fn same_client_key_reuses_session_and_redirect() {
        let store = Arc::new(InMemoryBillingStore::new());
        let price = store.seed(|state| state.seed_subscription_price(PlanCycle::Monthly, 300_000));
        let registry = ProviderRegistry::new()
            .register(Arc::new(redirecting_adapter(PaymentProvider::Zarinpal, 1)));
        let usecase = CheckoutUseCase::new(Arc::clone(&store), registry, settings());
        let user_id = Uuid::new_v4();

        let first = usecase
            .create_checkout_session(user_id, price.price_id, PaymentProvider::Zarinpal, Some("k1".to_string()))
            .await
            .unwrap();
        let second = usecase
            .create_checkout_session(user_id, price.price_id, PaymentProvider::Zarinpal, Some("k1".to_string()))
            .await
            .unwrap();

        let CheckoutOutcome::Redirect {
            session_id: first_id,
            redirect_url: first_url,
            reused: first_reused,
        } = first
        else {
            panic!("expected a redirect, got {first:?}");
        };
        let CheckoutOutcome::Redirect {
            session_id: second_id,
            redirect_url: second_url,
            reused: second_reused,
        } = second
        else {
            panic!("expected a redirect, got {second:?}");
        };
        assert!(!first_reused);
        assert!(second_reused);
        assert_eq!(first_id, second_id);
        assert_eq!(first_url, second_url);
        assert_eq!(store.snapshot().checkout_sessions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_or_inactive_price_is_rejected() {
        let store = Arc::new(InMemoryBillingStore::new());
        let price = store.seed(|state| {
            let price = state.seed_subscription_price(PlanCycle::Monthly, 300_000);
            state.prices[0].is_active = false;
            price
        });
        let registry = ProviderRegistry::new()
            .register(Arc::new(redirecting_adapter(PaymentProvider::Zarinpal, 0)));
        let usecase = CheckoutUseCase::new(Arc::clone(&store), registry, settings());

        let inactive = usecase
            .create_checkout_session(Uuid::new_v4(), price.price_id, PaymentProvider::Zarinpal, None)
            .await
            .unwrap();
        let missing = usecase
            .create_checkout_session(Uuid::new_v4(), Uuid::new_v4(), PaymentProvider::Zarinpal, None)
            .await
            .unwrap();
        let unconfigured = usecase
            .create_checkout_session(Uuid::new_v4(), price.price_id, PaymentProvider::IdPay, None)
            .await
            .unwrap();

        assert_eq!(inactive, CheckoutOutcome::rejected(CheckoutRejection::PriceInactive));
        assert_eq!(missing, CheckoutOutcome::rejected(CheckoutRejection::PriceNotFound));
        assert_eq!(unconfigured, CheckoutOutcome::rejected(CheckoutRejection::ProviderUnavailable));
    }

    #[tokio::test]
    async fn slow_provider_times_out_and_leaves_session_reusable() {
        let store = Arc::new(InMemoryBillingStore::new());
        let price = store.seed(|state| state.seed_job_credit_price(80_000, 4));
        let registry = ProviderRegistry::new().register(Arc::new(StalledAdapter));
        let usecase = CheckoutUseCase::new(
            Arc::clone(&store),
            registry,
            CheckoutSettings {
                provider_timeout: Duration::from_millis(20),
                ..settings()
            },
        );

        let outcome = usecase
            .create_checkout_session(Uuid::new_v4(), price.price_id, PaymentProvider::PayPing, Some("k".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, CheckoutOutcome::rejected(CheckoutRejection::ProviderTimeout));
        let state = store.snapshot();
        assert_eq!(state.checkout_sessions.len(), 1);
        assert!(state.checkout_sessions[0].redirect_url.is_none());
    }

    #[test]
    fn callback_url_keeps_existing_query() {
        let session_id = Uuid::new_v4();
        let url = callback_url("https://app.test/return?lang=fa", session_id).unwrap();
        assert_eq!(url, format!("https://app.test/return?lang=fa&session_id={session_id}"));
    }
}
