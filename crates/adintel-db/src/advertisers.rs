//! Database operations for the `advertisers` table.

use adintel_core::ScrapeFrequency;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const ADVERTISER_COLUMNS: &str = "id, public_id, name, company_id, linkedin_url, logo_url, \
     total_ads_found, last_scraped_at, scrape_frequency, next_scrape_at, custom_start_urls, \
     results_limit, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `advertisers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdvertiserRow {
    pub id: i64,
    pub public_id: Uuid,
    pub name: String,
    /// Numeric LinkedIn company id, as text.
    pub company_id: Option<String>,
    pub linkedin_url: Option<String>,
    pub logo_url: Option<String>,
    /// Size of the most recently fetched dataset, not a running total.
    pub total_ads_found: i32,
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// `weekly` or `monthly`; `NULL` exactly when nobody follows the advertiser.
    pub scrape_frequency: Option<String>,
    pub next_scrape_at: Option<DateTime<Utc>>,
    pub custom_start_urls: Option<Vec<String>>,
    pub results_limit: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdvertiserRow {
    /// Decoded `scrape_frequency` column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] if the stored value is not a known tier.
    pub fn frequency(&self) -> Result<Option<ScrapeFrequency>, DbError> {
        self.scrape_frequency
            .as_deref()
            .map(ScrapeFrequency::try_from)
            .transpose()
            .map_err(DbError::from)
    }
}

/// Input for [`create_advertiser`].
#[derive(Debug, Clone, Default)]
pub struct NewAdvertiser<'a> {
    pub name: &'a str,
    pub company_id: Option<&'a str>,
    pub linkedin_url: Option<&'a str>,
    pub custom_start_urls: Option<&'a [String]>,
    pub results_limit: Option<i32>,
}

/// Aggregate fields refreshed after each storage pass.
#[derive(Debug, Clone, Default)]
pub struct AdvertiserScrapeSnapshot<'a> {
    pub total_ads_found: i32,
    pub logo_url: Option<&'a str>,
    pub company_id: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Creates a new advertiser row with no schedule.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including unique
/// constraint violations on `company_id` / `linkedin_url`).
pub async fn create_advertiser(
    pool: &PgPool,
    advertiser: &NewAdvertiser<'_>,
) -> Result<AdvertiserRow, DbError> {
    let row = sqlx::query_as::<_, AdvertiserRow>(&format!(
        "INSERT INTO advertisers \
             (public_id, name, company_id, linkedin_url, custom_start_urls, results_limit) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {ADVERTISER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(advertiser.name)
    .bind(advertiser.company_id)
    .bind(advertiser.linkedin_url)
    .bind(advertiser.custom_start_urls)
    .bind(advertiser.results_limit)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Fetches one advertiser by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the advertiser does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_advertiser(pool: &PgPool, id: i64) -> Result<AdvertiserRow, DbError> {
    sqlx::query_as::<_, AdvertiserRow>(&format!(
        "SELECT {ADVERTISER_COLUMNS} FROM advertisers WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Writes the aggregate fields after a storage pass.
///
/// `last_scraped_at` becomes `NOW()` and `total_ads_found` is overwritten.
/// A non-`NULL` `logo_url` replaces the stored one. `company_id` is only
/// backfilled when the advertiser has none and no other advertiser already
/// claims it (merging duplicates is an admin task).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the advertiser does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn record_advertiser_scrape(
    pool: &PgPool,
    id: i64,
    snapshot: &AdvertiserScrapeSnapshot<'_>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE advertisers a \
         SET last_scraped_at = NOW(), \
             total_ads_found = $2, \
             logo_url = COALESCE($3, a.logo_url), \
             company_id = CASE \
                 WHEN a.company_id IS NULL \
                      AND $4::TEXT IS NOT NULL \
                      AND NOT EXISTS (SELECT 1 FROM advertisers o WHERE o.company_id = $4) \
                 THEN $4 \
                 ELSE a.company_id \
             END, \
             updated_at = NOW() \
         WHERE a.id = $1",
    )
    .bind(id)
    .bind(snapshot.total_ads_found)
    .bind(snapshot.logo_url)
    .bind(snapshot.company_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Overwrites both schedule fields.
///
/// `frequency = None` clears the schedule; the schema rejects a frequency
/// without a next run time (and vice versa).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the advertiser does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_advertiser_schedule(
    pool: &PgPool,
    id: i64,
    frequency: Option<ScrapeFrequency>,
    next_scrape_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE advertisers \
         SET scrape_frequency = $2, next_scrape_at = $3, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(frequency.map(ScrapeFrequency::as_str))
    .bind(next_scrape_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Pushes `next_scrape_at` forward after a successful scheduled run.
///
/// Leaves unscheduled advertisers untouched (a follower may have left while
/// the run was in flight). Returns whether a row was updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn advance_advertiser_schedule(
    pool: &PgPool,
    id: i64,
    next_scrape_at: DateTime<Utc>,
    scraped_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE advertisers \
         SET next_scrape_at = $2, last_scraped_at = $3, updated_at = NOW() \
         WHERE id = $1 AND scrape_frequency IS NOT NULL",
    )
    .bind(id)
    .bind(next_scrape_at)
    .bind(scraped_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns scheduled advertisers whose `next_scrape_at` is at or before `now`
/// and that have no run currently in flight, most overdue first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_due_advertisers(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<AdvertiserRow>, DbError> {
    let rows = sqlx::query_as::<_, AdvertiserRow>(&format!(
        "SELECT {ADVERTISER_COLUMNS} FROM advertisers a \
         WHERE a.scrape_frequency IS NOT NULL \
           AND a.next_scrape_at <= $1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM scrape_runs r \
               WHERE r.advertiser_id = a.id AND r.status = 'running' \
           ) \
         ORDER BY a.next_scrape_at, a.id"
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
