use async_trait::async_trait;

use haven_common::error::HavenResult;

/// Key-value settings store. Credentials and feature toggles live here and
/// are re-read where freshness matters (e.g. on every sync start), never
/// cached across runs.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> HavenResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> HavenResult<()>;
}
