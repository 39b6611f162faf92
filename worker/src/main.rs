use anyhow::Result;
use backend::usecases::entitlement_sync::EntitlementSyncUseCase;
use billing_core::infra::db::{
    postgres::postgres_connection, repositories::billing_store::BillingPostgres,
};
use std::sync::Arc;
use tracing::{error, info};
use worker::{
    axum_http, config,
    services::sweep_loop::{self, PgAdvisoryLock},
};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("Worker exited with error: {:#}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    billing_core::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&dotenvy_env.database.url)?;
    info!("Postgres connection has been established");

    let db_pool_arc = Arc::new(postgres_pool);

    let store = Arc::new(BillingPostgres::new(Arc::clone(&db_pool_arc)));
    let entitlement_sync = Arc::new(EntitlementSyncUseCase::new(store));
    let sweep_lock = Arc::new(PgAdvisoryLock::new(
        Arc::clone(&db_pool_arc),
        dotenvy_env.sweep.advisory_lock_key,
    ));

    let sweep = tokio::spawn(sweep_loop::run_sweep_loop(
        sweep_lock,
        entitlement_sync,
        dotenvy_env.sweep.interval,
    ));

    let server_config = Arc::clone(&dotenvy_env);
    let health_server = tokio::spawn(async move { axum_http::http_serve::start(server_config).await });

    // The health server returns on SIGTERM; the sweep loop never does on its own.
    tokio::select! {
        result = sweep => result??,
        result = health_server => result??,
    };
    Ok(())
}
