//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the two
//! recurring sweeps: syncing in-flight scrape runs and starting scheduled
//! scrapes for due advertisers.

use std::sync::Arc;

use adintel_provider::ProviderClient;
use adintel_sync::SyncSettings;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    provider: Arc<ProviderClient>,
    settings: Arc<SyncSettings>,
    config: &adintel_core::AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_sync_job(
        &scheduler,
        &config.sync_cron,
        pool.clone(),
        Arc::clone(&provider),
        Arc::clone(&settings),
    )
    .await?;
    register_start_due_job(&scheduler, &config.start_due_cron, pool, provider, settings).await?;

    scheduler.start().await?;
    tracing::info!(
        sync_cron = %config.sync_cron,
        start_due_cron = %config.start_due_cron,
        "scheduler: started"
    );
    Ok(scheduler)
}

/// Syncs every running scrape run inside the sync window.
async fn register_sync_job(
    scheduler: &JobScheduler,
    cron: &str,
    pool: PgPool,
    provider: Arc<ProviderClient>,
    settings: Arc<SyncSettings>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = pool.clone();
        let provider = Arc::clone(&provider);
        let settings = Arc::clone(&settings);

        Box::pin(async move {
            match adintel_sync::sync_all_running(&pool, &provider, &settings).await {
                Ok(summary) if summary.synced > 0 || !summary.errors.is_empty() => {
                    tracing::info!(
                        synced = summary.synced,
                        completed = summary.completed,
                        failed = summary.failed,
                        errors = summary.errors.len(),
                        "scheduler: sync sweep complete"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "scheduler: sync sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Starts scheduled scrapes for advertisers whose `next_scrape_at` has passed.
async fn register_start_due_job(
    scheduler: &JobScheduler,
    cron: &str,
    pool: PgPool,
    provider: Arc<ProviderClient>,
    settings: Arc<SyncSettings>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = pool.clone();
        let provider = Arc::clone(&provider);
        let settings = Arc::clone(&settings);

        Box::pin(async move {
            tracing::info!("scheduler: starting due advertisers");
            if let Err(e) =
                adintel_sync::start_due_advertisers(&pool, &provider, &settings).await
            {
                tracing::error!(error = %e, "scheduler: start-due sweep failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
