//! Ad storage engine.
//!
//! Persists one dataset snapshot for one advertiser. The same run's dataset
//! is fetched repeatedly while it fills, so every write here is keyed by the
//! ad's external id and safe to repeat.

use adintel_core::JobType;
use adintel_db::{
    record_advertiser_scrape, update_ad_liveness, upsert_ad, AdvertiserScrapeSnapshot, DbError,
};
use adintel_provider::{company_id_from_url, transform_ad};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::count_i32;

/// Counts from one [`store_ads`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreResult {
    pub ads_new: i32,
    pub ads_updated: i32,
    /// Items that produced an ad; skipped items are not counted.
    pub total_processed: i32,
}

/// Transforms and upserts `raw_ads` for `advertiser_id`, then refreshes the
/// advertiser's aggregate fields.
///
/// For [`JobType::Scheduled`] an ad that already exists only has its
/// liveness fields touched (end date, impressions, `last_seen_at`); creative
/// content is left as first captured. For [`JobType::Initial`], and for any
/// ad not yet stored, the full record is upserted.
///
/// The advertiser's `total_ads_found` becomes `raw_ads.len()`, a snapshot of
/// the dataset rather than a running total.
///
/// # Errors
///
/// Returns [`DbError`] on the first failed write. Rows written before the
/// failure stay written; re-running the same batch completes it.
pub async fn store_ads(
    pool: &PgPool,
    raw_ads: &[Value],
    advertiser_id: i64,
    job_type: JobType,
) -> Result<StoreResult, DbError> {
    let mut result = StoreResult::default();
    let mut logo_url: Option<String> = None;
    let mut company_id: Option<String> = None;

    for (index, raw) in raw_ads.iter().enumerate() {
        let Some(ad) = transform_ad(raw, advertiser_id) else {
            tracing::warn!(advertiser_id, index, "skipping dataset item without an ad id");
            continue;
        };

        if result.total_processed == 0 {
            company_id = ad.advertiser_url.as_deref().and_then(company_id_from_url);
        }
        if logo_url.is_none() {
            logo_url.clone_from(&ad.advertiser_logo_url);
        }

        let refreshed = match job_type {
            JobType::Scheduled => update_ad_liveness(pool, &ad).await?,
            JobType::Initial => false,
        };

        if refreshed {
            result.ads_updated += 1;
        } else if upsert_ad(pool, &ad).await? {
            result.ads_new += 1;
        } else {
            result.ads_updated += 1;
        }
        result.total_processed += 1;
    }

    record_advertiser_scrape(
        pool,
        advertiser_id,
        &AdvertiserScrapeSnapshot {
            total_ads_found: count_i32(raw_ads.len()),
            logo_url: logo_url.as_deref(),
            company_id: company_id.as_deref(),
        },
    )
    .await?;

    tracing::debug!(
        advertiser_id,
        job_type = %job_type,
        ads_new = result.ads_new,
        ads_updated = result.ads_updated,
        total_processed = result.total_processed,
        "stored ads"
    );

    Ok(result)
}
