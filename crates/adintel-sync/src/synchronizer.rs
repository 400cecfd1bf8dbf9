//! Scrape run synchronizer.
//!
//! `sync_scrape_run` is the one state-machine step: read the provider's view
//! of a run, ingest whatever its dataset holds now, and move the persisted
//! run to a terminal status once the provider says it is done. Every caller
//! (interactive poll, cron sweep, CLI) goes through it; concurrent calls for
//! the same run are tolerated because each write is an idempotent overwrite
//! derived from the same provider state.

use adintel_core::{JobType, RunStatus, ScrapeFrequency};
use adintel_db::{
    advance_advertiser_schedule, finish_scrape_run, get_advertiser, get_scrape_run,
    list_running_scrape_runs_since, record_scrape_run_progress, DbError, ScrapeRunOutcome,
    ScrapeRunRow,
};
use adintel_provider::ProviderClient;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::storage::{store_ads, StoreResult};
use crate::{count_i32, SyncError, SyncSettings};

/// A run's state after one sync step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub scrape_run_id: i64,
    pub status: RunStatus,
    pub ads_found: i32,
    /// Set once the run is terminal.
    pub ads_new: Option<i32>,
    pub ads_updated: Option<i32>,
    pub cost_usd: Option<Decimal>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SyncOutcome {
    fn from_row(row: &ScrapeRunRow) -> Result<Self, DbError> {
        Ok(Self {
            scrape_run_id: row.id,
            status: row.run_status()?,
            ads_found: row.ads_found,
            ads_new: row.ads_new,
            ads_updated: row.ads_updated,
            cost_usd: row.cost_usd,
            completed_at: row.completed_at,
            error_message: row.error_message.clone(),
        })
    }
}

/// Advances one scrape run.
///
/// Returns `Ok(None)` when the run has no provider run id. While the
/// provider has not allocated a dataset the persisted state is returned
/// untouched. Otherwise the current dataset is stored and `ads_found` is
/// overwritten with its size; when the provider status is terminal the run
/// is finished with cost `items × cost_per_item_usd`. A successful scheduled
/// run also advances the advertiser's `next_scrape_at`.
///
/// A provider run that ends without ever allocating a dataset is finished
/// with zero items.
///
/// Syncing an already-terminal run stores the dataset again. Its ads exist
/// by then, so the run's counts are rewritten as `ads_new = 0` and
/// `ads_updated = ads_found`; `completed_at` and cost are unchanged.
///
/// # Errors
///
/// - [`SyncError::Provider`] if the status or dataset read fails. The run is
///   left `running`; a later sync may still succeed.
/// - [`SyncError::Db`] if the run does not exist or a write fails.
pub async fn sync_scrape_run(
    pool: &PgPool,
    provider: &ProviderClient,
    settings: &SyncSettings,
    scrape_run_id: i64,
) -> Result<Option<SyncOutcome>, SyncError> {
    let run = get_scrape_run(pool, scrape_run_id).await?;
    let Some(external_run_id) = run.external_run_id.as_deref() else {
        tracing::warn!(scrape_run_id, "scrape run has no provider run id; nothing to sync");
        return Ok(None);
    };
    let job_type = run.job_type()?;

    let provider_run = provider.get_run_status(external_run_id).await?;
    let terminal = provider_run.status.is_terminal();
    let dataset_id = run
        .external_dataset_id
        .as_deref()
        .or(provider_run.dataset_id.as_deref());

    let (ads_found, stored) = match dataset_id {
        Some(dataset_id) => {
            let items: Vec<Value> = provider.get_dataset_items(dataset_id).await?;
            let ads_found = count_i32(items.len());
            let stored = store_ads(pool, &items, run.advertiser_id, job_type).await?;
            record_scrape_run_progress(pool, run.id, Some(dataset_id), ads_found).await?;
            (ads_found, stored)
        }
        None if terminal => {
            tracing::warn!(
                scrape_run_id,
                provider_status = provider_run.status.as_str(),
                "provider run ended without a dataset"
            );
            (0, StoreResult::default())
        }
        None => {
            tracing::debug!(scrape_run_id, "provider has not allocated a dataset yet");
            return Ok(Some(SyncOutcome::from_row(&run)?));
        }
    };

    if !terminal {
        tracing::debug!(scrape_run_id, ads_found, "scrape run still in flight");
        return Ok(Some(SyncOutcome {
            ads_found,
            ..SyncOutcome::from_row(&run)?
        }));
    }

    let succeeded = provider_run.status.is_success();
    let error_message = (!succeeded).then(|| {
        format!(
            "provider run ended with status {}",
            provider_run.status.as_str()
        )
    });

    let finished = finish_scrape_run(
        pool,
        run.id,
        &ScrapeRunOutcome {
            status: if succeeded {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            },
            ads_new: stored.ads_new,
            ads_updated: stored.ads_updated,
            cost_usd: settings.cost_per_item_usd * Decimal::from(ads_found),
            error_message: error_message.as_deref(),
        },
    )
    .await?;

    tracing::info!(
        scrape_run_id,
        advertiser_id = run.advertiser_id,
        status = %finished.status,
        ads_found,
        ads_new = stored.ads_new,
        ads_updated = stored.ads_updated,
        "scrape run finished"
    );

    if succeeded && job_type == JobType::Scheduled {
        let completed_at = finished.completed_at.unwrap_or_else(Utc::now);
        advance_schedule(pool, run.advertiser_id, completed_at).await?;
    }

    Ok(Some(SyncOutcome::from_row(&finished)?))
}

/// Moves `next_scrape_at` one interval past `completed_at`. Advertisers
/// without a recurring frequency are left alone.
async fn advance_schedule(
    pool: &PgPool,
    advertiser_id: i64,
    completed_at: DateTime<Utc>,
) -> Result<(), DbError> {
    let advertiser = get_advertiser(pool, advertiser_id).await?;
    let Some(days) = advertiser
        .frequency()?
        .and_then(ScrapeFrequency::interval_days)
    else {
        tracing::debug!(advertiser_id, "no recurring frequency; schedule not advanced");
        return Ok(());
    };

    let next_scrape_at = completed_at + Duration::days(days);
    advance_advertiser_schedule(pool, advertiser_id, next_scrape_at, completed_at).await?;
    tracing::info!(advertiser_id, %next_scrape_at, "advertiser schedule advanced");
    Ok(())
}

/// A run that could not be synced during a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSyncFailure {
    pub scrape_run_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSyncSummary {
    pub synced: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_running: usize,
    pub errors: Vec<RunSyncFailure>,
}

impl BatchSyncSummary {
    fn record(&mut self, outcome: &SyncOutcome) {
        self.synced += 1;
        match outcome.status {
            RunStatus::Completed => self.completed += 1,
            RunStatus::Failed => self.failed += 1,
            RunStatus::Running => self.still_running += 1,
        }
    }
}

/// Syncs every `running` run started within the configured window, one at a
/// time. A failing run is logged and recorded in `errors`; the sweep goes on.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] only if the initial run listing fails.
pub async fn sync_all_running(
    pool: &PgPool,
    provider: &ProviderClient,
    settings: &SyncSettings,
) -> Result<BatchSyncSummary, DbError> {
    let since = Utc::now() - Duration::hours(settings.sync_window_hours);
    let runs = list_running_scrape_runs_since(pool, since).await?;

    let mut summary = BatchSyncSummary::default();
    for run in &runs {
        match sync_scrape_run(pool, provider, settings, run.id).await {
            Ok(Some(outcome)) => summary.record(&outcome),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(scrape_run_id = run.id, error = %e, "failed to sync scrape run");
                summary.errors.push(RunSyncFailure {
                    scrape_run_id: run.id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        candidates = runs.len(),
        synced = summary.synced,
        completed = summary.completed,
        failed = summary.failed,
        still_running = summary.still_running,
        errors = summary.errors.len(),
        "batch sync finished"
    );

    Ok(summary)
}

/// Calls [`sync_scrape_run`] until the run is terminal or `max_attempts`
/// syncs have been made, sleeping `interval` between attempts.
///
/// Returns the last outcome seen, which is still `running` if attempts ran
/// out.
///
/// # Errors
///
/// Propagates the first [`SyncError`] from a sync step.
pub async fn poll_until_terminal(
    pool: &PgPool,
    provider: &ProviderClient,
    settings: &SyncSettings,
    scrape_run_id: i64,
    interval: std::time::Duration,
    max_attempts: u32,
) -> Result<Option<SyncOutcome>, SyncError> {
    let mut last = None;
    for attempt in 1..=max_attempts {
        let Some(outcome) = sync_scrape_run(pool, provider, settings, scrape_run_id).await? else {
            return Ok(None);
        };
        if outcome.status.is_terminal() {
            return Ok(Some(outcome));
        }

        tracing::debug!(
            scrape_run_id,
            attempt,
            max_attempts,
            ads_found = outcome.ads_found,
            "run still in flight"
        );
        last = Some(outcome);
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(last)
}
