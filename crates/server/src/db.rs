use std::time::Duration;

use adu_core::config::PostgresConfig;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a PostgreSQL connection pool and run migrations.
///
/// Returns `Ok(None)` only when PostgreSQL is not configured. A configured
/// database that cannot be reached or migrated is an error.
pub async fn init_pg_pool(config: &PostgresConfig) -> anyhow::Result<Option<PgPool>> {
    if !config.is_configured() {
        warn!("DATABASE_URL not configured, submissions are kept in memory");
        return Ok(None);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&config.connection_string())
        .await
        .with_context(|| format!("failed to connect to PostgreSQL at {}", config.host))?;
    info!("PostgreSQL connected: {}", config.host);

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;
    info!("Database migrations applied successfully");

    Ok(Some(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postgres(url: Option<&str>) -> PostgresConfig {
        PostgresConfig {
            url: url.map(str::to_string),
            host: "127.0.0.1".to_string(),
            port: 1,
            database: "none".to_string(),
            username: None,
            password: None,
            ssl_mode: "disable".to_string(),
            max_connections: 1,
        }
    }

    #[tokio::test]
    async fn unconfigured_postgres_is_none() {
        assert!(init_pg_pool(&postgres(None)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_postgres_is_an_error() {
        let result = init_pg_pool(&postgres(Some("postgres://u:p@127.0.0.1:1/none"))).await;
        assert!(result.is_err());
    }
}
