pub mod alerts;
pub mod portfolio;
pub mod raw;
pub mod settings;
pub mod sync;
pub mod utilities;
pub mod vendors;

use haven_common::error::{HavenError, HavenResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> HavenResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))
}
