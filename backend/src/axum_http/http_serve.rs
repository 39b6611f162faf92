use crate::{
    axum_http::{
        default_routers,
        routers::{self, operator::OperatorRouteState},
    },
    config::config_model::DotEnvyConfig,
    usecases::{
        billing_dispatch::BillingDispatchUseCase,
        checkout::{CheckoutSettings, CheckoutUseCase},
        course_installments::CourseInstallmentsUseCase,
        entitlement_sync::EntitlementSyncUseCase,
        job_credits::JobCreditUseCase,
        payment_recorder::PaymentRecorderUseCase,
        subscription_lifecycle::SubscriptionLifecycleUseCase,
        webhook_ingestion::WebhookIngestionUseCase,
    },
};
use anyhow::Result;
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use billing_core::infra::db::{
    postgres::postgres_connection::PgPoolSquad, repositories::billing_store::BillingPostgres,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let store = Arc::new(BillingPostgres::new(Arc::clone(&db_pool)));
    let registry = config.providers.registry();
    info!(providers = ?registry.providers(), "payment providers registered");

    let checkout_settings = CheckoutSettings {
        return_url: config.checkout.callback_base_url.clone(),
        provider_timeout: config.checkout.provider_start_timeout,
    };

    let webhook_usecase = WebhookIngestionUseCase::new(Arc::clone(&store), registry.clone());
    let checkout_usecase =
        CheckoutUseCase::new(Arc::clone(&store), registry.clone(), checkout_settings.clone());
    let course_usecase =
        Arc::new(CourseInstallmentsUseCase::new(Arc::clone(&store), registry, checkout_settings));
    let operator_state = OperatorRouteState {
        token: config.operator.token.clone(),
        entitlement_sync: Arc::new(EntitlementSyncUseCase::new(Arc::clone(&store))),
        payment_recorder: Arc::new(PaymentRecorderUseCase::new(Arc::clone(&store))),
    };

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/webhooks",
            routers::webhooks::routes(Arc::new(webhook_usecase)),
        )
        .nest(
            "/api/v1/billing/checkout",
            routers::checkout::routes(Arc::new(checkout_usecase)),
        )
        .nest(
            "/api/v1/billing/courses",
            routers::courses::routes(Arc::clone(&course_usecase)),
        )
        .nest(
            "/api/v1/billing/semesters",
            routers::courses::semester_routes(course_usecase),
        )
        .nest(
            "/api/v1/billing/payments",
            routers::payments::routes(Arc::new(BillingDispatchUseCase::new(Arc::clone(&store)))),
        )
        .nest(
            "/api/v1/billing/subscriptions",
            routers::subscriptions::routes(Arc::new(SubscriptionLifecycleUseCase::new(
                Arc::clone(&store),
            ))),
        )
        .nest(
            "/api/v1/billing/job-credits",
            routers::job_credits::routes(Arc::new(JobCreditUseCase::new(Arc::clone(&store)))),
        )
        .nest("/internal/v1", routers::operator::routes(operator_state))
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
