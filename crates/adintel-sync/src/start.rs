//! Starting provider runs.

use adintel_core::JobType;
use adintel_db::{
    create_scrape_run, get_advertiser, list_due_advertisers, AdvertiserRow, DbError,
    NewScrapeRun, ScrapeRunRow,
};
use adintel_provider::{company_id_from_url, ProviderClient, ProviderError, ScrapeConfig};
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::budget::check_budget;
use crate::{SyncError, SyncSettings};

/// Starts a provider run for one advertiser and records it as `running`.
///
/// The budget is checked first. Nothing is written unless the provider
/// accepted the run.
///
/// # Errors
///
/// - [`SyncError::BudgetExceeded`] if this month's spend has reached the limit.
/// - [`SyncError::Provider`] with [`ProviderError::MissingTarget`] if the
///   advertiser has no usable start URL or company id, or any other provider
///   failure from the start call.
/// - [`SyncError::Db`] if the advertiser does not exist or the insert fails.
pub async fn start_scrape_run(
    pool: &PgPool,
    provider: &ProviderClient,
    settings: &SyncSettings,
    advertiser_id: i64,
    job_type: JobType,
) -> Result<ScrapeRunRow, SyncError> {
    let budget = check_budget(pool, settings.monthly_budget_usd).await?;
    if !budget.ok {
        return Err(SyncError::BudgetExceeded {
            current_spend: budget.current_spend,
            limit: budget.limit,
        });
    }

    let advertiser = get_advertiser(pool, advertiser_id).await?;
    let config = scrape_config_for(&advertiser, settings.default_results_limit)
        .ok_or(ProviderError::MissingTarget)?;

    let started = provider.start_run(&config).await?;
    let run = create_scrape_run(
        pool,
        &NewScrapeRun {
            advertiser_id,
            job_type,
            external_run_id: &started.run_id,
            external_dataset_id: started.dataset_id.as_deref(),
        },
    )
    .await?;

    tracing::info!(
        scrape_run_id = run.id,
        advertiser_id,
        %job_type,
        external_run_id = %started.run_id,
        "scrape run started"
    );
    Ok(run)
}

/// Provider input for an advertiser: custom start URLs win over the company
/// id, which falls back to the one in the advertiser's LinkedIn URL. The
/// advertiser's own positive results limit wins over `default_limit`.
#[must_use]
pub fn scrape_config_for(
    advertiser: &AdvertiserRow,
    default_limit: Option<u32>,
) -> Option<ScrapeConfig> {
    let company_id = advertiser.company_id.clone().or_else(|| {
        advertiser
            .linkedin_url
            .as_deref()
            .and_then(company_id_from_url)
    });
    let results_limit = advertiser
        .results_limit
        .and_then(|limit| u32::try_from(limit).ok())
        .filter(|limit| *limit > 0)
        .or(default_limit);

    ScrapeConfig::from_parts(
        advertiser.custom_start_urls.as_deref(),
        company_id.as_deref(),
        results_limit,
    )
}

/// An advertiser whose scheduled start failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartFailure {
    pub advertiser_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartDueSummary {
    pub started: usize,
    /// Due advertisers left unstarted because the budget ran out.
    pub skipped_budget: usize,
    pub failed: usize,
    pub errors: Vec<StartFailure>,
}

/// Starts a `scheduled` run for every advertiser whose `next_scrape_at` has
/// passed and that has no run in flight.
///
/// The budget is re-checked before each start; once it is exhausted the
/// remaining advertisers are counted as `skipped_budget` and left for the
/// next sweep. Other failures are recorded per advertiser.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] only if listing due advertisers fails.
pub async fn start_due_advertisers(
    pool: &PgPool,
    provider: &ProviderClient,
    settings: &SyncSettings,
) -> Result<StartDueSummary, DbError> {
    let due = list_due_advertisers(pool, Utc::now()).await?;
    let mut summary = StartDueSummary::default();

    for (index, advertiser) in due.iter().enumerate() {
        match start_scrape_run(pool, provider, settings, advertiser.id, JobType::Scheduled).await
        {
            Ok(_) => summary.started += 1,
            Err(SyncError::BudgetExceeded {
                current_spend,
                limit,
            }) => {
                summary.skipped_budget = due.len() - index;
                tracing::warn!(
                    %current_spend,
                    %limit,
                    skipped = summary.skipped_budget,
                    "budget reached; leaving remaining due advertisers for later"
                );
                break;
            }
            Err(e) => {
                tracing::error!(
                    advertiser_id = advertiser.id,
                    error = %e,
                    "failed to start scheduled scrape"
                );
                summary.failed += 1;
                summary.errors.push(StartFailure {
                    advertiser_id: advertiser.id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        due = due.len(),
        started = summary.started,
        skipped_budget = summary.skipped_budget,
        failed = summary.failed,
        "start-due sweep finished"
    );
    Ok(summary)
}
