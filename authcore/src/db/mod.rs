//! PostgreSQL pool and migrations for the user store

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Connect a pool sized and timed by `config`
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect_with(connect_options(config)?)
        .await
        .context("Failed to connect to the user database")?;

    info!(
        max = config.max_connections,
        min = config.min_connections,
        "User database pool ready"
    );
    Ok(pool)
}

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(&config.url)
        .context("Invalid database.url")?
        .application_name("authcore");
    Ok(options)
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
}

/// Create or upgrade the `users` table
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("User table migration failed")?;
    info!("User table migrations applied");
    Ok(())
}
