// server/src/db/mod.rs

pub mod pg_store;

pub use pg_store::PgIdentityStore;

use crate::config::AppConfig;
use crate::errors::Result as AppResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Opens the connection pool and, when configured, applies `migrations/`.
pub async fn connect(config: &AppConfig) -> AppResult<PgPool> {
  let pool = PgPoolOptions::new()
    .max_connections(10)
    .acquire_timeout(Duration::from_secs(5))
    .connect(&config.database_url)
    .await?;
  info!("Successfully connected to the database.");

  if config.run_migrations {
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied.");
  }
  Ok(pool)
}
