//! Database operations for `scrape_runs`.

use adintel_core::{JobType, RunStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SCRAPE_RUN_COLUMNS: &str = "id, public_id, advertiser_id, status, job_type, \
     external_run_id, external_dataset_id, ads_found, ads_new, ads_updated, cost_usd, \
     started_at, completed_at, error_message";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `scrape_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapeRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub advertiser_id: i64,
    pub status: String,
    pub job_type: String,
    /// Always set by the start flow; nullable only for rows created by hand.
    pub external_run_id: Option<String>,
    /// Unknown until the provider allocates a dataset.
    pub external_dataset_id: Option<String>,
    /// Live item count, rewritten on every sync.
    pub ads_found: i32,
    pub ads_new: Option<i32>,
    pub ads_updated: Option<i32>,
    pub cost_usd: Option<Decimal>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ScrapeRunRow {
    /// Decoded `status` column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] if the stored value is not a known status.
    pub fn run_status(&self) -> Result<RunStatus, DbError> {
        Ok(RunStatus::try_from(self.status.as_str())?)
    }

    /// Decoded `job_type` column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] if the stored value is not a known job type.
    pub fn job_type(&self) -> Result<JobType, DbError> {
        Ok(JobType::try_from(self.job_type.as_str())?)
    }

    /// Cost rounded to cents for display; storage keeps four decimal places.
    #[must_use]
    pub fn cost_usd_rounded(&self) -> Option<Decimal> {
        self.cost_usd.map(|c| c.round_dp(2))
    }
}

/// Input for [`create_scrape_run`].
#[derive(Debug, Clone)]
pub struct NewScrapeRun<'a> {
    pub advertiser_id: i64,
    pub job_type: JobType,
    pub external_run_id: &'a str,
    pub external_dataset_id: Option<&'a str>,
}

/// Terminal bookkeeping written by [`finish_scrape_run`].
#[derive(Debug, Clone)]
pub struct ScrapeRunOutcome<'a> {
    pub status: RunStatus,
    pub ads_new: i32,
    pub ads_updated: i32,
    pub cost_usd: Decimal,
    pub error_message: Option<&'a str>,
}

/// Filters for [`list_scrape_runs`]. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRunFilter {
    pub advertiser_id: Option<i64>,
    pub status: Option<RunStatus>,
    pub limit: i64,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a new run in `running` status with `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including an unknown
/// `advertiser_id`).
pub async fn create_scrape_run(
    pool: &PgPool,
    run: &NewScrapeRun<'_>,
) -> Result<ScrapeRunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "INSERT INTO scrape_runs \
             (public_id, advertiser_id, status, job_type, external_run_id, external_dataset_id) \
         VALUES ($1, $2, 'running', $3, $4, $5) \
         RETURNING {SCRAPE_RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(run.advertiser_id)
    .bind(run.job_type.as_str())
    .bind(run.external_run_id)
    .bind(run.external_dataset_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Records in-flight progress: the dataset id (kept if already known) and
/// the current item count.
///
/// `ads_found` is overwritten, not incremented, so it mirrors whatever the
/// provider dataset holds right now.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has the given `id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_scrape_run_progress(
    pool: &PgPool,
    id: i64,
    external_dataset_id: Option<&str>,
    ads_found: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE scrape_runs \
         SET external_dataset_id = COALESCE(external_dataset_id, $2), \
             ads_found = $3 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(external_dataset_id)
    .bind(ads_found)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Moves a run to a terminal status and writes its final counts and cost.
///
/// Safe to call again on an already-terminal run: values are overwritten and
/// the first `completed_at` is kept. A re-sync re-stores ads that now already
/// exist, so the rewritten counts report them all as updated (`ads_new` 0).
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if `outcome.status` is not terminal,
/// [`DbError::NotFound`] if no run has the given `id`, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn finish_scrape_run(
    pool: &PgPool,
    id: i64,
    outcome: &ScrapeRunOutcome<'_>,
) -> Result<ScrapeRunRow, DbError> {
    if !outcome.status.is_terminal() {
        return Err(DbError::InvalidTransition {
            entity: "scrape run",
            id,
            expected_status: "completed or failed",
        });
    }

    let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "UPDATE scrape_runs \
         SET status = $2, \
             ads_new = $3, \
             ads_updated = $4, \
             cost_usd = $5, \
             error_message = $6, \
             completed_at = COALESCE(completed_at, NOW()) \
         WHERE id = $1 \
         RETURNING {SCRAPE_RUN_COLUMNS}"
    ))
    .bind(id)
    .bind(outcome.status.as_str())
    .bind(outcome.ads_new)
    .bind(outcome.ads_updated)
    .bind(outcome.cost_usd)
    .bind(outcome.error_message)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_scrape_run(pool: &PgPool, id: i64) -> Result<ScrapeRunRow, DbError> {
    let row = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {SCRAPE_RUN_COLUMNS} FROM scrape_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns `running` runs started at or after `since`, oldest first.
///
/// Runs older than `since` are left for manual investigation.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_running_scrape_runs_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<ScrapeRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {SCRAPE_RUN_COLUMNS} FROM scrape_runs \
         WHERE status = 'running' AND started_at >= $1 \
         ORDER BY started_at, id"
    ))
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the most recent runs matching `filter`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scrape_runs(
    pool: &PgPool,
    filter: &ScrapeRunFilter,
) -> Result<Vec<ScrapeRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ScrapeRunRow>(&format!(
        "SELECT {SCRAPE_RUN_COLUMNS} FROM scrape_runs \
         WHERE ($1::BIGINT IS NULL OR advertiser_id = $1) \
           AND ($2::TEXT IS NULL OR status = $2) \
         ORDER BY started_at DESC, id DESC \
         LIMIT $3"
    ))
    .bind(filter.advertiser_id)
    .bind(filter.status.map(RunStatus::as_str))
    .bind(filter.limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sums `cost_usd` over completed runs with `from <= completed_at < until`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn sum_completed_cost_between(
    pool: &PgPool,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Decimal, DbError> {
    let total = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(cost_usd), 0) FROM scrape_runs \
         WHERE status = 'completed' AND completed_at >= $1 AND completed_at < $2",
    )
    .bind(from)
    .bind(until)
    .fetch_one(pool)
    .await?;

    Ok(total)
}
