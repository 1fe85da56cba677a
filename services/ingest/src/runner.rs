use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, NaiveDate, Utc};

use haven_common::error::{HavenError, HavenResult};
use haven_common::types::{ResourceType, UpsertOutcome};
use haven_db::alerts::repositories::SyncFailureAlertRepository;
use haven_db::portfolio::repositories::PortfolioRepository;
use haven_db::raw::models::RawEvent;
use haven_db::raw::repositories::RawEventRepository;
use haven_db::settings::repositories::SettingsRepository;
use haven_db::sync::models::{SyncErrorEntry, SyncMode, SyncRun, SyncRunMetadata};
use haven_db::sync::repositories::SyncRunRepository;
use haven_db::utilities::repositories::UtilitiesRepository;
use haven_db::vendors::repositories::VendorRepository;

use crate::alerts::{handle_run_failure, handle_run_success, AlertNotifier, AlertPolicy};
use crate::appfolio::client::AppfolioClient;
use crate::appfolio::models::external_id_field;
use crate::normalize::{NormalizeOutcome, Normalizer};

pub const CONNECTION_NAME: &str = "appfolio";

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// A `running` run younger than this blocks a new start unless forced.
    pub recency_window: Duration,
    /// Batch size when replaying unprocessed events from an earlier run.
    pub replay_batch: i64,
    /// Retry passes for records whose parent had not been synced yet.
    pub max_deferral_passes: usize,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            recency_window: Duration::hours(2),
            replay_batch: 500,
            max_deferral_passes: 3,
        }
    }
}

impl SyncPolicy {
    pub async fn from_settings(settings: &dyn SettingsRepository) -> HavenResult<Self> {
        let defaults = Self::default();
        let recency_window = settings
            .get("sync.recency_window_hours")
            .await?
            .and_then(|v| v.parse().ok())
            .map(Duration::hours)
            .unwrap_or(defaults.recency_window);

        Ok(Self {
            recency_window,
            ..defaults
        })
    }
}

/// Drives one sync run end to end: page fetch, raw capture, normalization,
/// per-resource metrics, terminal transition and failure alerting.
pub struct SyncEngine {
    client: AppfolioClient,
    runs: Arc<dyn SyncRunRepository>,
    raw_events: Arc<dyn RawEventRepository>,
    portfolio: Arc<dyn PortfolioRepository>,
    vendors: Arc<dyn VendorRepository>,
    utilities: Arc<dyn UtilitiesRepository>,
    alerts: Arc<dyn SyncFailureAlertRepository>,
    notifier: Arc<dyn AlertNotifier>,
    policy: SyncPolicy,
    alert_policy: AlertPolicy,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: AppfolioClient,
        runs: Arc<dyn SyncRunRepository>,
        raw_events: Arc<dyn RawEventRepository>,
        portfolio: Arc<dyn PortfolioRepository>,
        vendors: Arc<dyn VendorRepository>,
        utilities: Arc<dyn UtilitiesRepository>,
        alerts: Arc<dyn SyncFailureAlertRepository>,
        notifier: Arc<dyn AlertNotifier>,
        policy: SyncPolicy,
        alert_policy: AlertPolicy,
    ) -> Self {
        Self {
            client,
            runs,
            raw_events,
            portfolio,
            vendors,
            utilities,
            alerts,
            notifier,
            policy,
            alert_policy,
        }
    }

    /// Create a pending run, refusing if another run is already active
    /// within the recency window. `force` bypasses the guard; it does not
    /// reclaim the stuck run.
    pub async fn prepare(&self, mode: SyncMode, force: bool) -> HavenResult<SyncRun> {
        if !force {
            if let Some(active) = self.runs.find_active_within(self.policy.recency_window).await? {
                return Err(HavenError::Validation(format!(
                    "sync run {} is already running (started {}); pass force to start anyway",
                    active.id,
                    active
                        .started_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string()),
                )));
            }
        }
        self.runs.create(mode).await
    }

    /// Execute a pending run to a terminal state. Record-level problems are
    /// contained inside the loop; only run-level failures (auth, retries
    /// exhausted, lost durability) end the run as `failed`.
    pub async fn execute(&self, run: SyncRun) -> HavenResult<SyncRun> {
        let run = self.runs.mark_running(run.id).await?;
        tracing::info!(run = %run.id, mode = run.mode.as_str(), "sync run started");

        let since = match run.mode {
            SyncMode::Full => None,
            SyncMode::Incremental => self
                .runs
                .find_last_completed()
                .await?
                .and_then(|r| r.started_at)
                .map(|t| t.date_naive()),
        };

        let mut metadata = SyncRunMetadata::default();
        match self.sync_all_resources(&run, since, &mut metadata).await {
            Ok(()) => {
                let total = metadata.total_synced() as i64;
                let done = self.runs.complete(run.id, total, &metadata).await?;
                handle_run_success(self.alerts.as_ref(), CONNECTION_NAME).await?;
                tracing::info!(
                    run = %done.id,
                    total_resources = done.total_resources,
                    total_errors = done.total_errors,
                    "sync run completed"
                );
                Ok(done)
            }
            Err(summary) => {
                tracing::error!(run = %run.id, error = %summary, "sync run failed");
                // A failed run always carries a nonzero error count, even
                // when the failure struck before any record was processed
                let total_errors = metadata.total_errors().max(1) as i64;
                let failed = self
                    .runs
                    .fail(run.id, &summary, total_errors, &metadata)
                    .await?;
                handle_run_failure(
                    self.alerts.as_ref(),
                    self.notifier.as_ref(),
                    &self.alert_policy,
                    CONNECTION_NAME,
                    &summary,
                )
                .await?;
                Ok(failed)
            }
        }
    }

    async fn sync_all_resources(
        &self,
        run: &SyncRun,
        since: Option<NaiveDate>,
        metadata: &mut SyncRunMetadata,
    ) -> Result<(), String> {
        let mappings = self
            .utilities
            .active_mappings()
            .await
            .map_err(|e| format!("loading gl mappings: {e}"))?;
        let normalizer = Normalizer::new(
            self.portfolio.clone(),
            self.vendors.clone(),
            self.utilities.clone(),
            mappings,
        );

        for resource in ResourceType::all() {
            let resource = *resource;
            let started = Instant::now();
            let mut deferred: Vec<RawEvent> = Vec::new();

            // Replay anything a crashed run captured but never consumed
            let leftovers = self
                .raw_events
                .unprocessed(resource, self.policy.replay_batch)
                .await
                .map_err(|e| format!("{resource} replay scan: {e}"))?;
            if !leftovers.is_empty() {
                tracing::info!(resource = %resource, count = leftovers.len(), "replaying unprocessed events");
            }
            for event in leftovers {
                self.process_event(&normalizer, event, resource, metadata, &mut deferred)
                    .await;
            }

            let mut page = self
                .client
                .fetch_first_page(resource, since)
                .await
                .map_err(|e| format!("{resource} fetch failed: {e}"))?;

            loop {
                tracing::debug!(resource = %resource, rows = page.results.len(), "fetched page");
                for row in &page.results {
                    let external_id = extract_external_id(resource, row);
                    // Durable capture before any normalization is attempted
                    let event = self
                        .raw_events
                        .capture(run.id, resource, &external_id, row)
                        .await
                        .map_err(|e| format!("{resource} raw capture failed: {e}"))?;
                    self.process_event(&normalizer, event, resource, metadata, &mut deferred)
                        .await;
                }

                match page.next_page_url.take() {
                    Some(url) => {
                        page = self
                            .client
                            .fetch_next_page(&url)
                            .await
                            .map_err(|e| format!("{resource} fetch failed: {e}"))?;
                    }
                    None => break,
                }
            }

            // Parents may have landed later in the page stream; retry
            // deferred children a bounded number of times
            for _ in 0..self.policy.max_deferral_passes {
                if deferred.is_empty() {
                    break;
                }
                let retry = std::mem::take(&mut deferred);
                let before = retry.len();
                for event in retry {
                    self.process_event(&normalizer, event, resource, metadata, &mut deferred)
                        .await;
                }
                if deferred.len() == before {
                    break;
                }
            }

            // Whatever is still deferred has a parent this run never saw
            for event in deferred.drain(..) {
                tracing::warn!(
                    resource = %resource,
                    external_id = %event.external_id,
                    "dropping record with unresolved parent"
                );
                let metrics = metadata.metrics_mut(resource);
                metrics.skipped += 1;
                metrics.errors += 1;
                metadata.push_error(
                    resource,
                    SyncErrorEntry {
                        external_id: Some(event.external_id.clone()),
                        message: "parent reference unresolved at end of run".to_string(),
                        occurred_at: Utc::now(),
                    },
                );
                self.finish_event(event.id, resource, metadata).await;
            }

            metadata.metrics_mut(resource).duration_ms = started.elapsed().as_millis() as u64;
            self.runs
                .save_metadata(run.id, metadata)
                .await
                .map_err(|e| format!("persisting run metadata: {e}"))?;

            let metrics = metadata.metrics(resource);
            tracing::info!(
                resource = %resource,
                created = metrics.created,
                updated = metrics.updated,
                skipped = metrics.skipped,
                errors = metrics.errors,
                "resource sync finished"
            );
        }

        Ok(())
    }

    /// Record-level outcome handling. Never fails the run: mapping and
    /// validation problems become skipped + ledger entries, unresolved
    /// parents go to the deferred queue.
    async fn process_event(
        &self,
        normalizer: &Normalizer,
        event: RawEvent,
        resource: ResourceType,
        metadata: &mut SyncRunMetadata,
        deferred: &mut Vec<RawEvent>,
    ) {
        match normalizer.normalize_event(&event).await {
            Ok(NormalizeOutcome::Applied(outcome)) => {
                let metrics = metadata.metrics_mut(resource);
                match outcome {
                    UpsertOutcome::Created => metrics.created += 1,
                    UpsertOutcome::Updated => metrics.updated += 1,
                    UpsertOutcome::Skipped => metrics.skipped += 1,
                }
                self.finish_event(event.id, resource, metadata).await;
            }
            Ok(NormalizeOutcome::Deferred(reason)) => {
                tracing::debug!(
                    resource = %resource,
                    external_id = %event.external_id,
                    reason,
                    "deferring record"
                );
                deferred.push(event);
            }
            Err(e) => {
                tracing::warn!(
                    resource = %resource,
                    external_id = %event.external_id,
                    error = %e,
                    "record failed to normalize"
                );
                let metrics = metadata.metrics_mut(resource);
                metrics.skipped += 1;
                metrics.errors += 1;
                metadata.push_error(
                    resource,
                    SyncErrorEntry {
                        external_id: Some(event.external_id.clone()),
                        message: e.to_string(),
                        occurred_at: Utc::now(),
                    },
                );
                self.finish_event(event.id, resource, metadata).await;
            }
        }
    }

    /// Consume the event exactly once, including for skipped records.
    async fn finish_event(
        &self,
        event_id: uuid::Uuid,
        resource: ResourceType,
        metadata: &mut SyncRunMetadata,
    ) {
        if let Err(e) = self.raw_events.mark_processed(event_id).await {
            tracing::warn!(event = %event_id, error = %e, "failed to mark raw event processed");
            metadata.metrics_mut(resource).errors += 1;
        }
    }
}

fn extract_external_id(resource: ResourceType, row: &serde_json::Value) -> String {
    match row.get(external_id_field(resource)) {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::TracingNotifier;
    use crate::appfolio::client::{AppfolioClient, AppfolioClientConfig, AppfolioCredentials};
    use async_trait::async_trait;
    use haven_db::portfolio::models::{
        NewLease, NewLedgerTransaction, NewProperty, NewTenant, NewUnit, NewWorkOrder,
    };
    use haven_db::sync::models::{SyncStatus, MAX_ERRORS_PER_RESOURCE};
    use haven_db::utilities::models::{
        BillDetail, NewBillDetail, NewUtilityExpense, UtilityAccountMapping,
    };
    use haven_db::vendors::models::{NewVendor, Vendor};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ── In-memory repositories ──────────────────────────────────

    #[derive(Default)]
    struct MemRuns {
        runs: Mutex<Vec<SyncRun>>,
    }

    impl MemRuns {
        fn with_running_run(self) -> Self {
            {
                let mut runs = self.runs.lock().unwrap();
                runs.push(SyncRun {
                    id: Uuid::new_v4(),
                    mode: SyncMode::Full,
                    status: SyncStatus::Running,
                    started_at: Some(Utc::now() - Duration::minutes(10)),
                    finished_at: None,
                    total_resources: 0,
                    total_errors: 0,
                    error_summary: None,
                    metadata: SyncRunMetadata::default(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                });
            }
            self
        }

        fn get_sync(&self, id: Uuid) -> SyncRun {
            self.runs
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .expect("run exists")
        }
    }

    #[async_trait]
    impl SyncRunRepository for MemRuns {
        async fn create(&self, mode: SyncMode) -> HavenResult<SyncRun> {
            let run = SyncRun {
                id: Uuid::new_v4(),
                mode,
                status: SyncStatus::Pending,
                started_at: None,
                finished_at: None,
                total_resources: 0,
                total_errors: 0,
                error_summary: None,
                metadata: SyncRunMetadata::default(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.runs.lock().unwrap().push(run.clone());
            Ok(run)
        }

        async fn get(&self, id: Uuid) -> HavenResult<Option<SyncRun>> {
            Ok(self.runs.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        async fn find_active_within(&self, window: Duration) -> HavenResult<Option<SyncRun>> {
            let cutoff = Utc::now() - window;
            Ok(self
                .runs
                .lock()
                .unwrap()
                .iter()
                .find(|r| {
                    r.status == SyncStatus::Running
                        && r.started_at.map(|t| t >= cutoff).unwrap_or(false)
                })
                .cloned())
        }

        async fn find_last_completed(&self) -> HavenResult<Option<SyncRun>> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.status == SyncStatus::Completed)
                .max_by_key(|r| r.started_at)
                .cloned())
        }

        async fn mark_running(&self, id: Uuid) -> HavenResult<SyncRun> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .iter_mut()
                .find(|r| r.id == id && r.status == SyncStatus::Pending)
                .ok_or_else(|| HavenError::Validation("not pending".to_string()))?;
            run.status = SyncStatus::Running;
            run.started_at = Some(Utc::now());
            Ok(run.clone())
        }

        async fn save_metadata(&self, id: Uuid, metadata: &SyncRunMetadata) -> HavenResult<()> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .iter_mut()
                .find(|r| r.id == id && r.status == SyncStatus::Running)
                .ok_or_else(|| HavenError::Validation("not running".to_string()))?;
            run.metadata = metadata.clone();
            Ok(())
        }

        async fn complete(
            &self,
            id: Uuid,
            total_resources: i64,
            metadata: &SyncRunMetadata,
        ) -> HavenResult<SyncRun> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .iter_mut()
                .find(|r| r.id == id && r.status == SyncStatus::Running)
                .ok_or_else(|| HavenError::Validation("not running".to_string()))?;
            run.status = SyncStatus::Completed;
            run.finished_at = Some(Utc::now());
            run.total_resources = total_resources;
            run.total_errors = metadata.total_errors() as i64;
            run.metadata = metadata.clone();
            Ok(run.clone())
        }

        async fn fail(
            &self,
            id: Uuid,
            summary: &str,
            total_errors: i64,
            metadata: &SyncRunMetadata,
        ) -> HavenResult<SyncRun> {
            let mut runs = self.runs.lock().unwrap();
            let run = runs
                .iter_mut()
                .find(|r| r.id == id && r.status == SyncStatus::Running)
                .ok_or_else(|| HavenError::Validation("not running".to_string()))?;
            run.status = SyncStatus::Failed;
            run.finished_at = Some(Utc::now());
            run.error_summary = Some(summary.to_string());
            run.total_errors = total_errors;
            run.metadata = metadata.clone();
            Ok(run.clone())
        }
    }

    #[derive(Default)]
    struct MemRaw {
        events: Mutex<Vec<RawEvent>>,
    }

    #[async_trait]
    impl RawEventRepository for MemRaw {
        async fn capture(
            &self,
            sync_run_id: Uuid,
            resource_type: ResourceType,
            external_id: &str,
            payload: &serde_json::Value,
        ) -> HavenResult<RawEvent> {
            let event = RawEvent {
                id: Uuid::new_v4(),
                sync_run_id,
                resource_type,
                external_id: external_id.to_string(),
                payload: payload.clone(),
                pulled_at: Utc::now(),
                processed_at: None,
            };
            self.events.lock().unwrap().push(event.clone());
            Ok(event)
        }

        async fn unprocessed(
            &self,
            resource_type: ResourceType,
            limit: i64,
        ) -> HavenResult<Vec<RawEvent>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.resource_type == resource_type && e.processed_at.is_none())
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn mark_processed(&self, id: Uuid) -> HavenResult<()> {
            let mut events = self.events.lock().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id == id && e.processed_at.is_none())
                .ok_or_else(|| {
                    HavenError::Validation("missing or already processed".to_string())
                })?;
            event.processed_at = Some(Utc::now());
            Ok(())
        }
    }

    /// Tracks which external ids exist per entity so upserts report
    /// created vs updated like the real store.
    #[derive(Default)]
    struct MemPortfolio {
        properties: Mutex<HashMap<i64, Uuid>>,
        units: Mutex<HashMap<i64, Uuid>>,
        tenants: Mutex<HashMap<i64, Uuid>>,
        leases: Mutex<HashMap<i64, Uuid>>,
        transactions: Mutex<HashMap<i64, Uuid>>,
        work_orders: Mutex<HashMap<i64, Uuid>>,
    }

    fn upsert_into(map: &Mutex<HashMap<i64, Uuid>>, external_id: i64) -> UpsertOutcome {
        let mut map = map.lock().unwrap();
        if map.contains_key(&external_id) {
            UpsertOutcome::Updated
        } else {
            map.insert(external_id, Uuid::new_v4());
            UpsertOutcome::Created
        }
    }

    #[async_trait]
    impl PortfolioRepository for MemPortfolio {
        async fn upsert_property(&self, property: NewProperty) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.properties, property.external_id))
        }

        async fn upsert_unit(&self, unit: NewUnit) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.units, unit.external_id))
        }

        async fn upsert_tenant(&self, tenant: NewTenant) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.tenants, tenant.external_id))
        }

        async fn upsert_lease(&self, lease: NewLease) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.leases, lease.external_id))
        }

        async fn upsert_ledger_transaction(
            &self,
            transaction: NewLedgerTransaction,
        ) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.transactions, transaction.external_id))
        }

        async fn upsert_work_order(&self, work_order: NewWorkOrder) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.work_orders, work_order.external_id))
        }

        async fn property_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
            Ok(self.properties.lock().unwrap().get(&external_id).copied())
        }

        async fn unit_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
            Ok(self.units.lock().unwrap().get(&external_id).copied())
        }

        async fn tenant_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
            Ok(self.tenants.lock().unwrap().get(&external_id).copied())
        }

        async fn lease_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
            Ok(self.leases.lock().unwrap().get(&external_id).copied())
        }

        async fn update_tenant_delinquency(
            &self,
            external_id: i64,
            _amount_cents: i64,
            _as_of: NaiveDate,
        ) -> HavenResult<UpsertOutcome> {
            if self.tenants.lock().unwrap().contains_key(&external_id) {
                Ok(UpsertOutcome::Updated)
            } else {
                Ok(UpsertOutcome::Skipped)
            }
        }
    }

    #[derive(Default)]
    struct MemVendors {
        vendors: Mutex<HashMap<i64, Uuid>>,
    }

    #[async_trait]
    impl VendorRepository for MemVendors {
        async fn upsert_vendor(&self, vendor: NewVendor) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.vendors, vendor.external_id))
        }

        async fn get(&self, _id: Uuid) -> HavenResult<Option<Vendor>> {
            Ok(None)
        }

        async fn vendor_id_by_external(&self, external_id: i64) -> HavenResult<Option<Uuid>> {
            Ok(self.vendors.lock().unwrap().get(&external_id).copied())
        }

        async fn list_active(&self) -> HavenResult<Vec<Vendor>> {
            Ok(Vec::new())
        }

        async fn duplicates_of(&self, _canonical_id: Uuid) -> HavenResult<Vec<Vendor>> {
            Ok(Vec::new())
        }

        async fn link_as_duplicate(
            &self,
            _vendor_id: Uuid,
            _canonical_id: Uuid,
        ) -> HavenResult<Uuid> {
            unimplemented!("not used in these tests")
        }

        async fn unlink(&self, _vendor_id: Uuid) -> HavenResult<()> {
            unimplemented!("not used in these tests")
        }
    }

    #[derive(Default)]
    struct MemUtilities {
        bills: Mutex<HashMap<i64, Uuid>>,
        expenses: Mutex<HashMap<Uuid, NewUtilityExpense>>,
        mappings: Mutex<Vec<UtilityAccountMapping>>,
    }

    #[async_trait]
    impl UtilitiesRepository for MemUtilities {
        async fn upsert_bill_detail(&self, bill: NewBillDetail) -> HavenResult<UpsertOutcome> {
            Ok(upsert_into(&self.bills, bill.external_id))
        }

        async fn bill_detail_id_by_external(
            &self,
            external_id: i64,
        ) -> HavenResult<Option<Uuid>> {
            Ok(self.bills.lock().unwrap().get(&external_id).copied())
        }

        async fn active_mappings(&self) -> HavenResult<Vec<UtilityAccountMapping>> {
            Ok(self.mappings.lock().unwrap().clone())
        }

        async fn upsert_mapping(
            &self,
            _gl_account_number: &str,
            _utility_type: &str,
        ) -> HavenResult<UpsertOutcome> {
            unimplemented!("not used in these tests")
        }

        async fn deactivate_mapping(&self, _gl_account_number: &str) -> HavenResult<()> {
            unimplemented!("not used in these tests")
        }

        async fn bill_details_in_range(
            &self,
            _from: Option<NaiveDate>,
            _to: Option<NaiveDate>,
        ) -> HavenResult<Vec<BillDetail>> {
            Ok(Vec::new())
        }

        async fn delete_expenses_in_range(
            &self,
            _from: Option<NaiveDate>,
            _to: Option<NaiveDate>,
        ) -> HavenResult<u64> {
            Ok(0)
        }

        async fn upsert_expense(&self, expense: NewUtilityExpense) -> HavenResult<UpsertOutcome> {
            let mut expenses = self.expenses.lock().unwrap();
            let outcome = if expenses.contains_key(&expense.bill_detail_id) {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Created
            };
            expenses.insert(expense.bill_detail_id, expense);
            Ok(outcome)
        }
    }

    #[derive(Default)]
    struct MemAlerts {
        failures: Mutex<i32>,
    }

    #[async_trait]
    impl SyncFailureAlertRepository for MemAlerts {
        async fn get_or_create(
            &self,
            connection: &str,
        ) -> HavenResult<haven_db::alerts::models::SyncFailureAlert> {
            Ok(haven_db::alerts::models::SyncFailureAlert {
                id: Uuid::new_v4(),
                connection: connection.to_string(),
                consecutive_failures: *self.failures.lock().unwrap(),
                last_failure_at: None,
                last_alerted_at: None,
                acknowledged_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }

        async fn record_failure(
            &self,
            connection: &str,
        ) -> HavenResult<haven_db::alerts::models::SyncFailureAlert> {
            *self.failures.lock().unwrap() += 1;
            self.get_or_create(connection).await
        }

        async fn record_success(&self, _connection: &str) -> HavenResult<()> {
            *self.failures.lock().unwrap() = 0;
            Ok(())
        }

        async fn mark_alerted(&self, _connection: &str) -> HavenResult<()> {
            Ok(())
        }

        async fn acknowledge(&self, _connection: &str) -> HavenResult<()> {
            Ok(())
        }
    }

    // ── Harness ─────────────────────────────────────────────────

    struct Harness {
        engine: SyncEngine,
        runs: Arc<MemRuns>,
        raw: Arc<MemRaw>,
        alerts: Arc<MemAlerts>,
    }

    fn make_harness(server: &MockServer, runs: MemRuns) -> Harness {
        let credentials = AppfolioCredentials {
            database: "testco".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        };
        let config = AppfolioClientConfig {
            max_retries: 0,
            timeout_secs: 5,
            requests_per_sec: 10_000.0,
            burst: 10_000.0,
        };
        let client = AppfolioClient::new(config, credentials)
            .unwrap()
            .with_base_url(&server.uri());

        let runs = Arc::new(runs);
        let raw = Arc::new(MemRaw::default());
        let alerts = Arc::new(MemAlerts::default());
        let engine = SyncEngine::new(
            client,
            runs.clone(),
            raw.clone(),
            Arc::new(MemPortfolio::default()),
            Arc::new(MemVendors::default()),
            Arc::new(MemUtilities::default()),
            alerts.clone(),
            Arc::new(TracingNotifier),
            SyncPolicy::default(),
            AlertPolicy::default(),
        );

        Harness {
            engine,
            runs,
            raw,
            alerts,
        }
    }

    /// Empty page for every report the test does not care about.
    async fn mount_empty_default(server: &MockServer) {
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": [], "next_page_url": null})),
            )
            .mount(server)
            .await;
    }

    fn property_row(id: i64) -> serde_json::Value {
        serde_json::json!({"property_id": id, "name": format!("Property {id}")})
    }

    // ── Tests ───────────────────────────────────────────────────

    #[tokio::test]
    async fn prepare_refuses_when_run_active() {
        let server = MockServer::start().await;
        let harness = make_harness(&server, MemRuns::default().with_running_run());

        let result = harness.engine.prepare(SyncMode::Full, false).await;
        assert!(matches!(result, Err(HavenError::Validation(_))));
    }

    #[tokio::test]
    async fn prepare_force_bypasses_guard() {
        let server = MockServer::start().await;
        let harness = make_harness(&server, MemRuns::default().with_running_run());

        let run = harness
            .engine
            .prepare(SyncMode::Full, true)
            .await
            .expect("forced start");
        assert_eq!(run.status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn three_page_property_scenario() {
        let server = MockServer::start().await;

        // Page 1: 50 new properties. Only the initial request carries the
        // paginate flag; cursor fetches send an empty body, so this mock
        // does not swallow the page-2 and page-3 requests
        let page1: Vec<_> = (0..50).map(property_row).collect();
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .and(wiremock::matchers::body_partial_json(
                serde_json::json!({"paginate_results": true}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": page1,
                "next_page_url": format!("{}/api/v1/reports/property_directory.json?page=2", server.uri()),
            })))
            .mount(&server)
            .await;

        // Page 2: 49 repeats + one malformed record (no name)
        let mut page2: Vec<_> = (0..49).map(property_row).collect();
        page2.push(serde_json::json!({"property_id": 999}));
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": page2,
                "next_page_url": format!("{}/api/v1/reports/property_directory.json?page=3", server.uri()),
            })))
            .mount(&server)
            .await;

        // Page 3: 12 repeats
        let page3: Vec<_> = (0..12).map(property_row).collect();
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"results": page3, "next_page_url": null}),
            ))
            .mount(&server)
            .await;

        mount_empty_default(&server).await;

        let harness = make_harness(&server, MemRuns::default());
        let run = harness
            .engine
            .prepare(SyncMode::Full, false)
            .await
            .expect("prepare");
        let done = harness.engine.execute(run).await.expect("execute");

        assert_eq!(done.status, SyncStatus::Completed);
        let metrics = done.metadata.metrics(ResourceType::Property);
        assert_eq!(metrics.created, 50);
        assert_eq!(metrics.updated, 61);
        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.errors, 1);

        let errors = &done.metadata.resource_errors["property"];
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].external_id.as_deref(), Some("999"));

        assert_eq!(done.total_resources, 111);
        assert_eq!(done.total_errors, 1);
    }

    #[tokio::test]
    async fn replayed_payload_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"results": [property_row(7)], "next_page_url": null}),
            ))
            .mount(&server)
            .await;
        mount_empty_default(&server).await;

        let harness = make_harness(&server, MemRuns::default());

        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        let first = harness.engine.execute(run).await.expect("first run");
        assert_eq!(first.metadata.metrics(ResourceType::Property).created, 1);

        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        let second = harness.engine.execute(run).await.expect("second run");
        let metrics = second.metadata.metrics(ResourceType::Property);
        assert_eq!(metrics.created, 0);
        assert_eq!(metrics.updated, 1);
    }

    #[tokio::test]
    async fn error_ledger_keeps_ten_most_recent() {
        let server = MockServer::start().await;

        // 15 malformed rows; each produces one ledger entry
        let rows: Vec<_> = (100..115)
            .map(|id| serde_json::json!({"property_id": id}))
            .collect();
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"results": rows, "next_page_url": null}),
            ))
            .mount(&server)
            .await;
        mount_empty_default(&server).await;

        let harness = make_harness(&server, MemRuns::default());
        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        let done = harness.engine.execute(run).await.expect("execute");

        assert_eq!(done.status, SyncStatus::Completed);
        assert_eq!(done.metadata.metrics(ResourceType::Property).errors, 15);

        let errors = &done.metadata.resource_errors["property"];
        assert_eq!(errors.len(), MAX_ERRORS_PER_RESOURCE);
        // The five oldest (100..105) were dropped
        assert_eq!(errors[0].external_id.as_deref(), Some("105"));
        assert_eq!(errors[9].external_id.as_deref(), Some("114"));
    }

    #[tokio::test]
    async fn auth_failure_fails_run_and_records_alert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let harness = make_harness(&server, MemRuns::default());
        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        let done = harness.engine.execute(run).await.expect("execute");

        assert_eq!(done.status, SyncStatus::Failed);
        let summary = done.error_summary.expect("summary");
        assert!(summary.contains("property"), "got: {summary}");
        assert!(summary.contains("401"), "got: {summary}");
        assert_eq!(*harness.alerts.failures.lock().unwrap(), 1);

        // Terminal run stays terminal
        let stored = harness.runs.get_sync(done.id);
        assert_eq!(stored.status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn completion_resets_failure_streak() {
        let server = MockServer::start().await;
        mount_empty_default(&server).await;

        let harness = make_harness(&server, MemRuns::default());
        *harness.alerts.failures.lock().unwrap() = 2;

        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        let done = harness.engine.execute(run).await.expect("execute");

        assert_eq!(done.status, SyncStatus::Completed);
        assert_eq!(*harness.alerts.failures.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unresolved_parent_becomes_consistency_error() {
        let server = MockServer::start().await;

        // A unit referencing a property the run never sees
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/unit_directory.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"unit_id": 5, "property_id": 404, "unit_name": "1A"}],
                "next_page_url": null,
            })))
            .mount(&server)
            .await;
        mount_empty_default(&server).await;

        let harness = make_harness(&server, MemRuns::default());
        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        let done = harness.engine.execute(run).await.expect("execute");

        assert_eq!(done.status, SyncStatus::Completed);
        let metrics = done.metadata.metrics(ResourceType::Unit);
        assert_eq!(metrics.created, 0);
        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.errors, 1);
        let errors = &done.metadata.resource_errors["unit"];
        assert!(errors[0].message.contains("parent"), "got: {}", errors[0].message);
    }

    #[tokio::test]
    async fn every_captured_event_is_consumed_exactly_once() {
        let server = MockServer::start().await;
        let rows: Vec<_> = (0..3).map(property_row).collect();
        Mock::given(method("POST"))
            .and(path("/api/v1/reports/property_directory.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"results": rows, "next_page_url": null}),
            ))
            .mount(&server)
            .await;
        mount_empty_default(&server).await;

        let harness = make_harness(&server, MemRuns::default());
        let run = harness.engine.prepare(SyncMode::Full, false).await.unwrap();
        harness.engine.execute(run).await.expect("execute");

        let events = harness.raw.events.lock().unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.resource_type == ResourceType::Property)
                .count(),
            3
        );
        assert!(events.iter().all(|e| e.processed_at.is_some()));
    }

    #[tokio::test]
    async fn incremental_uses_last_completed_start_as_cursor() {
        let server = MockServer::start().await;

        let runs = MemRuns::default();
        {
            let mut stored = runs.runs.lock().unwrap();
            stored.push(SyncRun {
                id: Uuid::new_v4(),
                mode: SyncMode::Full,
                status: SyncStatus::Completed,
                started_at: Some("2025-05-01T08:00:00Z".parse().unwrap()),
                finished_at: Some("2025-05-01T08:10:00Z".parse().unwrap()),
                total_resources: 0,
                total_errors: 0,
                error_summary: None,
                metadata: SyncRunMetadata::default(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        }

        Mock::given(method("POST"))
            .and(wiremock::matchers::body_partial_json(
                serde_json::json!({"modified_from": "2025-05-01"}),
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": [], "next_page_url": null})),
            )
            .expect(ResourceType::all().len() as u64)
            .mount(&server)
            .await;

        let harness = make_harness(&server, runs);
        let run = harness
            .engine
            .prepare(SyncMode::Incremental, false)
            .await
            .unwrap();
        let done = harness.engine.execute(run).await.expect("execute");
        assert_eq!(done.status, SyncStatus::Completed);
    }
}
