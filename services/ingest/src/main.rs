mod alerts;
mod appfolio;
mod dedup_job;
mod normalize;
mod reclassify;
mod runner;

use std::io::Write;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::PgPool;

use haven_common::error::{HavenError, HavenResult};
use haven_config::{init_tracing, AppConfig};
use haven_db::alerts::pg_repository::PgSyncFailureAlertRepository;
use haven_db::portfolio::pg_repository::PgPortfolioRepository;
use haven_db::raw::pg_repository::PgRawEventRepository;
use haven_db::settings::pg_repository::PgSettingsRepository;
use haven_db::sync::models::{SyncMode, SyncStatus};
use haven_db::sync::pg_repository::PgSyncRunRepository;
use haven_db::utilities::pg_repository::PgUtilitiesRepository;
use haven_db::vendors::models::AnalysisStatus;
use haven_db::vendors::pg_repository::{PgVendorAnalysisRepository, PgVendorRepository};
use haven_dedup::engine::DuplicateCandidate;
use haven_dedup::DedupConfig;

use crate::alerts::{AlertPolicy, TracingNotifier};
use crate::appfolio::client::{AppfolioClient, AppfolioClientConfig, AppfolioCredentials};
use crate::dedup_job::run_duplicate_analysis;
use crate::reclassify::reprocess_all;
use crate::runner::{SyncEngine, SyncPolicy};

#[derive(Parser)]
#[command(
    name = "haven-ingest",
    about = "Property-management ingestion and reconciliation engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Full,
    Incremental,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => SyncMode::Full,
            ModeArg::Incremental => SyncMode::Incremental,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Pull from the property-management API and upsert local entities
    Sync {
        #[arg(long, value_enum, default_value = "incremental")]
        mode: ModeArg,
        /// Start even if another run appears to be active
        #[arg(long)]
        force: bool,
    },
    /// Scan vendors for likely duplicates and print ranked candidates
    DedupScan {
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Rebuild derived utility expenses from bill details under the
    /// current GL-account mappings
    UtilitiesReprocess {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    init_tracing("info");
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    let pool = match haven_db::create_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("database error: {e}");
            std::process::exit(2);
        }
    };

    let code = match dispatch(cli.command, pool).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(command: Command, pool: PgPool) -> HavenResult<i32> {
    match command {
        Command::Sync { mode, force } => run_sync(pool, mode.into(), force).await,
        Command::DedupScan { threshold, limit } => run_dedup_scan(pool, threshold, limit).await,
        Command::UtilitiesReprocess { from, to, force } => {
            run_reprocess(pool, from, to, force).await
        }
    }
}

async fn run_sync(pool: PgPool, mode: SyncMode, force: bool) -> HavenResult<i32> {
    let settings = PgSettingsRepository::new(pool.clone());

    // Credentials are read fresh on every invocation so rotation in the
    // settings store takes effect without a restart
    let credentials = AppfolioCredentials::from_settings(&settings).await?;
    let client = AppfolioClient::new(AppfolioClientConfig::default(), credentials)
        .map_err(|e| HavenError::Internal(format!("building http client: {e}")))?;

    let policy = SyncPolicy::from_settings(&settings).await?;
    let alert_policy = AlertPolicy::from_settings(&settings).await?;

    let engine = SyncEngine::new(
        client,
        Arc::new(PgSyncRunRepository::new(pool.clone())),
        Arc::new(PgRawEventRepository::new(pool.clone())),
        Arc::new(PgPortfolioRepository::new(pool.clone())),
        Arc::new(PgVendorRepository::new(pool.clone())),
        Arc::new(PgUtilitiesRepository::new(pool.clone())),
        Arc::new(PgSyncFailureAlertRepository::new(pool)),
        Arc::new(TracingNotifier),
        policy,
        alert_policy,
    );

    let run = match engine.prepare(mode, force).await {
        Ok(run) => run,
        Err(HavenError::Validation(msg)) => {
            eprintln!("refusing to start: {msg}");
            return Ok(1);
        }
        Err(e) => return Err(e),
    };

    let done = engine.execute(run).await?;

    println!("run {} finished: {}", done.id, done.status.as_str());
    for (resource, metrics) in &done.metadata.resource_metrics {
        println!(
            "  {resource}: created={} updated={} skipped={} errors={} ({}ms)",
            metrics.created, metrics.updated, metrics.skipped, metrics.errors, metrics.duration_ms
        );
    }
    if let Some(summary) = &done.error_summary {
        eprintln!("  failure: {summary}");
    }

    Ok(if done.status == SyncStatus::Completed {
        0
    } else {
        1
    })
}

async fn run_dedup_scan(pool: PgPool, threshold: f64, limit: usize) -> HavenResult<i32> {
    let vendors = Arc::new(PgVendorRepository::new(pool.clone()));
    let analyses = Arc::new(PgVendorAnalysisRepository::new(pool));

    let done =
        run_duplicate_analysis(vendors, analyses, &DedupConfig::default(), threshold, limit)
            .await?;

    if done.status != AnalysisStatus::Completed {
        eprintln!(
            "analysis {} {}: {}",
            done.id,
            done.status.as_str(),
            done.error_message.as_deref().unwrap_or("unknown error")
        );
        return Ok(1);
    }

    let candidates: Vec<DuplicateCandidate> = serde_json::from_value(done.results)
        .map_err(|e| HavenError::Internal(format!("reading analysis results: {e}")))?;

    println!(
        "scanned {} vendors, {} comparisons, {} candidates at threshold {threshold}",
        done.vendors_scanned,
        done.comparisons_made,
        candidates.len()
    );
    for c in &candidates {
        println!(
            "  {:.3}  {} (#{}) ~ {} (#{})  [{}]",
            c.score,
            c.vendor_a_name,
            c.vendor_a_external_id,
            c.vendor_b_name,
            c.vendor_b_external_id,
            c.reasons.join(", ")
        );
    }

    Ok(0)
}

async fn run_reprocess(
    pool: PgPool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    force: bool,
) -> HavenResult<i32> {
    if !force {
        print!(
            "This deletes and rebuilds derived utility expenses{}. Continue? [y/N] ",
            match (from, to) {
                (None, None) => " for all dates".to_string(),
                (from, to) => format!(
                    " from {} to {}",
                    from.map(|d| d.to_string()).unwrap_or_else(|| "the beginning".to_string()),
                    to.map(|d| d.to_string()).unwrap_or_else(|| "now".to_string()),
                ),
            }
        );
        std::io::stdout()
            .flush()
            .map_err(|e| HavenError::Internal(e.to_string()))?;

        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .map_err(|e| HavenError::Internal(e.to_string()))?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("aborted");
            return Ok(1);
        }
    }

    let repo = PgUtilitiesRepository::new(pool);
    let stats = reprocess_all(&repo, from, to).await?;

    println!(
        "reprocess finished: created={} updated={} skipped={} unmatched={} errors={}",
        stats.created, stats.updated, stats.skipped, stats.unmatched, stats.errors
    );
    Ok(0)
}
