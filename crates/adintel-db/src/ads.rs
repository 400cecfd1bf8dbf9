//! Database operations for the `ads` table.

use adintel_core::{AdMedia, TransformedAd};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{types::Json, PgPool};

use crate::DbError;

const AD_COLUMNS: &str = "id, external_id, advertiser_id, format, body, headline, cta, \
     destination_url, media_url, media, start_date, end_date, impressions, \
     impressions_estimate, country_impressions, ad_library_url, advertiser_name, \
     advertiser_url, advertiser_logo_url, targeting, first_seen_at, last_seen_at, updated_at";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `ads` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdRow {
    pub id: i64,
    pub external_id: String,
    pub advertiser_id: i64,
    pub format: String,
    pub body: Option<String>,
    pub headline: Option<String>,
    pub cta: Option<String>,
    pub destination_url: Option<String>,
    pub media_url: Option<String>,
    /// Format-tagged payload; see [`AdMedia`].
    pub media: Option<serde_json::Value>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub impressions: Option<String>,
    pub impressions_estimate: i64,
    /// Object of country name to estimated impressions.
    pub country_impressions: serde_json::Value,
    pub ad_library_url: Option<String>,
    pub advertiser_name: Option<String>,
    pub advertiser_url: Option<String>,
    pub advertiser_logo_url: Option<String>,
    pub targeting: Option<serde_json::Value>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdRow {
    /// Typed view of the `media` column. `None` when absent or not a known shape.
    #[must_use]
    pub fn media(&self) -> Option<AdMedia> {
        self.media
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Returns the internal id of the ad with `external_id`, if stored.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_ad_id(pool: &PgPool, external_id: &str) -> Result<Option<i64>, DbError> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM ads WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Fetches a full ad row by its provider id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no ad has the given `external_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_ad_by_external_id(pool: &PgPool, external_id: &str) -> Result<AdRow, DbError> {
    sqlx::query_as::<_, AdRow>(&format!(
        "SELECT {AD_COLUMNS} FROM ads WHERE external_id = $1"
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts `ad` or rewrites every content field of the existing row.
///
/// `first_seen_at` is only written on insert and `advertiser_id` is never
/// reassigned on conflict. `last_seen_at` never moves backwards.
///
/// Returns `true` when the row was newly inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_ad(pool: &PgPool, ad: &TransformedAd) -> Result<bool, DbError> {
    let inserted = sqlx::query_scalar::<_, bool>(
        "INSERT INTO ads ( \
             external_id, advertiser_id, format, body, headline, cta, destination_url, \
             media_url, media, start_date, end_date, impressions, impressions_estimate, \
             country_impressions, ad_library_url, advertiser_name, advertiser_url, \
             advertiser_logo_url, targeting \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
         ON CONFLICT (external_id) DO UPDATE SET \
             format = EXCLUDED.format, \
             body = EXCLUDED.body, \
             headline = EXCLUDED.headline, \
             cta = EXCLUDED.cta, \
             destination_url = EXCLUDED.destination_url, \
             media_url = EXCLUDED.media_url, \
             media = EXCLUDED.media, \
             start_date = EXCLUDED.start_date, \
             end_date = EXCLUDED.end_date, \
             impressions = EXCLUDED.impressions, \
             impressions_estimate = EXCLUDED.impressions_estimate, \
             country_impressions = EXCLUDED.country_impressions, \
             ad_library_url = EXCLUDED.ad_library_url, \
             advertiser_name = EXCLUDED.advertiser_name, \
             advertiser_url = EXCLUDED.advertiser_url, \
             advertiser_logo_url = EXCLUDED.advertiser_logo_url, \
             targeting = EXCLUDED.targeting, \
             last_seen_at = GREATEST(ads.last_seen_at, NOW()), \
             updated_at = NOW() \
         RETURNING (xmax = 0)",
    )
    .bind(&ad.external_id)
    .bind(ad.advertiser_id)
    .bind(ad.format.as_str())
    .bind(ad.body.as_deref())
    .bind(ad.headline.as_deref())
    .bind(ad.cta.as_deref())
    .bind(ad.destination_url.as_deref())
    .bind(ad.media_url.as_deref())
    .bind(ad.media.as_ref().map(Json))
    .bind(ad.start_date)
    .bind(ad.end_date)
    .bind(ad.impressions.as_deref())
    .bind(ad.impressions_estimate)
    .bind(Json(&ad.country_impressions))
    .bind(ad.ad_library_url.as_deref())
    .bind(ad.advertiser_name.as_deref())
    .bind(ad.advertiser_url.as_deref())
    .bind(ad.advertiser_logo_url.as_deref())
    .bind(ad.targeting.as_ref())
    .fetch_one(pool)
    .await?;

    Ok(inserted)
}

/// Refreshes only the fields that change while an ad is live: end date,
/// impressions and the per-country breakdown. Creative content is untouched.
///
/// Returns `false` when no ad has `ad.external_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_ad_liveness(pool: &PgPool, ad: &TransformedAd) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE ads \
         SET end_date = $2, \
             impressions = $3, \
             impressions_estimate = $4, \
             country_impressions = $5, \
             last_seen_at = GREATEST(last_seen_at, NOW()), \
             updated_at = NOW() \
         WHERE external_id = $1",
    )
    .bind(&ad.external_id)
    .bind(ad.end_date)
    .bind(ad.impressions.as_deref())
    .bind(ad.impressions_estimate)
    .bind(Json(&ad.country_impressions))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
