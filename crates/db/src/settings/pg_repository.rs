use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::settings::repositories::SettingsRepository;
use haven_common::error::{HavenError, HavenResult};

#[derive(Clone)]
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn get(&self, key: &str) -> HavenResult<Option<String>> {
        let row = sqlx::query("select value from settings where key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set(&self, key: &str, value: &str) -> HavenResult<()> {
        sqlx::query(
            "insert into settings (key, value, updated_at)
             values ($1, $2, $3)
             on conflict (key) do update set value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| HavenError::Database(e.to_string()))?;

        Ok(())
    }
}
