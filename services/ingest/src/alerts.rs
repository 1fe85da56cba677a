use chrono::{Duration, Utc};

use haven_common::error::HavenResult;
use haven_db::alerts::repositories::SyncFailureAlertRepository;
use haven_db::settings::repositories::SettingsRepository;

/// When and how often to escalate consecutive run failures.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub failure_threshold: i32,
    pub min_interval: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            min_interval: Duration::minutes(60),
        }
    }
}

impl AlertPolicy {
    /// Tunables come from the settings store, with defaults when unset.
    pub async fn from_settings(settings: &dyn SettingsRepository) -> HavenResult<Self> {
        let defaults = Self::default();
        let failure_threshold = settings
            .get("alerts.failure_threshold")
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.failure_threshold);
        let min_interval = settings
            .get("alerts.min_interval_minutes")
            .await?
            .and_then(|v| v.parse().ok())
            .map(Duration::minutes)
            .unwrap_or(defaults.min_interval);

        Ok(Self {
            failure_threshold,
            min_interval,
        })
    }
}

/// Delivery seam. Email delivery lives outside this service; the default
/// implementation emits a structured log line the operator can route.
pub trait AlertNotifier: Send + Sync {
    fn notify(&self, connection: &str, consecutive_failures: i32, summary: &str);
}

pub struct TracingNotifier;

impl AlertNotifier for TracingNotifier {
    fn notify(&self, connection: &str, consecutive_failures: i32, summary: &str) {
        tracing::error!(
            connection,
            consecutive_failures,
            summary,
            "sync connection failing repeatedly"
        );
    }
}

/// Record a run-level failure and escalate if the streak crossed the
/// threshold. At most one notification per `min_interval`; a prior human
/// acknowledgment is cleared by the new failure (inside `record_failure`).
pub async fn handle_run_failure(
    repo: &dyn SyncFailureAlertRepository,
    notifier: &dyn AlertNotifier,
    policy: &AlertPolicy,
    connection: &str,
    summary: &str,
) -> HavenResult<()> {
    let alert = repo.record_failure(connection).await?;

    if alert.consecutive_failures < policy.failure_threshold {
        return Ok(());
    }

    let interval_elapsed = match alert.last_alerted_at {
        Some(last) => Utc::now() - last >= policy.min_interval,
        None => true,
    };
    if !interval_elapsed {
        tracing::debug!(connection, "alert suppressed by rate limit");
        return Ok(());
    }

    notifier.notify(connection, alert.consecutive_failures, summary);
    repo.mark_alerted(connection).await?;
    Ok(())
}

pub async fn handle_run_success(
    repo: &dyn SyncFailureAlertRepository,
    connection: &str,
) -> HavenResult<()> {
    repo.record_success(connection).await
}
