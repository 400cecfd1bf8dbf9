//! Shared advertiser schedule.
//!
//! An advertiser is scraped once for all of its followers, so its schedule is
//! the most demanding effective frequency among them.

use adintel_core::ScrapeFrequency;
use adintel_db::{list_follower_frequencies, set_advertiser_schedule, DbError};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

/// Schedule for a follower set: `(frequency, next_scrape_at)`, both `None`
/// when nobody follows or every follower is on a manual tier.
#[must_use]
pub fn plan_schedule<I>(
    frequencies: I,
    now: DateTime<Utc>,
) -> (Option<ScrapeFrequency>, Option<DateTime<Utc>>)
where
    I: IntoIterator<Item = ScrapeFrequency>,
{
    let best = ScrapeFrequency::best(frequencies);
    let next = best
        .and_then(ScrapeFrequency::interval_days)
        .map(|days| now + Duration::days(days));
    (best, next)
}

/// Recomputes and overwrites `advertiser_id`'s schedule from its current
/// followers. Call after every follow-state change.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the advertiser does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn recalculate_schedule(
    pool: &PgPool,
    advertiser_id: i64,
) -> Result<Option<ScrapeFrequency>, DbError> {
    let frequencies = list_follower_frequencies(pool, advertiser_id).await?;
    let followers = frequencies.len();
    let (frequency, next_scrape_at) = plan_schedule(frequencies, Utc::now());

    set_advertiser_schedule(pool, advertiser_id, frequency, next_scrape_at).await?;

    tracing::info!(
        advertiser_id,
        followers,
        frequency = frequency.map_or("none", ScrapeFrequency::as_str),
        next_scrape_at = ?next_scrape_at,
        "advertiser schedule recalculated"
    );

    Ok(frequency)
}
