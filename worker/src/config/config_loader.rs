use super::config_model::{Database, DotEnvyConfig, Sweep, WorkerServer};
use anyhow::{Context, Result, bail};
use std::time::Duration;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
// "billsync" as big-endian ASCII.
pub const DEFAULT_SWEEP_ADVISORY_LOCK_KEY: i64 = 0x6269_6c6c_7379_6e63;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let worker_server = WorkerServer {
        port: required("SERVER_PORT_WORKER")?
            .parse()
            .context("SERVER_PORT_WORKER is invalid")?,
        body_limit: optional("SERVER_BODY_LIMIT")
            .unwrap_or_else(|| "1".to_string())
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: optional("SERVER_TIMEOUT")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
    };

    let interval_secs = optional("SWEEP_INTERVAL_SECS")
        .map(|v| v.parse::<u64>())
        .transpose()
        .context("SWEEP_INTERVAL_SECS is invalid")?
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    if interval_secs == 0 {
        bail!("SWEEP_INTERVAL_SECS must be greater than zero");
    }

    let sweep = Sweep {
        interval: Duration::from_secs(interval_secs),
        advisory_lock_key: optional("SWEEP_ADVISORY_LOCK_KEY")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("SWEEP_ADVISORY_LOCK_KEY is invalid")?
            .unwrap_or(DEFAULT_SWEEP_ADVISORY_LOCK_KEY),
    };

    Ok(DotEnvyConfig {
        worker_server,
        database,
        sweep,
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
