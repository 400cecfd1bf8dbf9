//! Database operations for `plans` and `users`.

use adintel_core::ScrapeFrequency;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `plans` table. `NULL` limits mean unlimited.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlanRow {
    pub id: i64,
    pub name: String,
    pub default_frequency: String,
    pub max_followed: Option<i32>,
    pub max_tracked: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub public_id: Uuid,
    pub email: String,
    pub plan_id: Option<i64>,
    /// Takes precedence over the plan's `default_frequency` when set.
    pub scrape_frequency_override: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`create_plan`].
#[derive(Debug, Clone)]
pub struct NewPlan<'a> {
    pub name: &'a str,
    pub default_frequency: ScrapeFrequency,
    pub max_followed: Option<i32>,
    pub max_tracked: Option<i32>,
}

/// Plan limits next to the user's current counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct UserUsage {
    pub max_followed: Option<i32>,
    pub max_tracked: Option<i32>,
    /// Links in `following`.
    pub followed_count: i64,
    /// Links in `added` or `following`.
    pub tracked_count: i64,
}

/// Inserts a plan.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate name).
pub async fn create_plan(pool: &PgPool, plan: &NewPlan<'_>) -> Result<PlanRow, DbError> {
    let row = sqlx::query_as::<_, PlanRow>(
        "INSERT INTO plans (name, default_frequency, max_followed, max_tracked) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, name, default_frequency, max_followed, max_tracked, created_at",
    )
    .bind(plan.name)
    .bind(plan.default_frequency.as_str())
    .bind(plan.max_followed)
    .bind(plan.max_tracked)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Inserts a user on an optional plan.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate email).
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    plan_id: Option<i64>,
    frequency_override: Option<ScrapeFrequency>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (public_id, email, plan_id, scrape_frequency_override) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, public_id, email, plan_id, scrape_frequency_override, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(plan_id)
    .bind(frequency_override.map(ScrapeFrequency::as_str))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Effective frequency of every user currently following `advertiser_id`.
///
/// Each value is the user's override, else the plan default, else `manual`.
///
/// # Errors
///
/// Returns [`DbError::InvalidColumn`] for an unknown stored tier, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn list_follower_frequencies(
    pool: &PgPool,
    advertiser_id: i64,
) -> Result<Vec<ScrapeFrequency>, DbError> {
    let raw = sqlx::query_scalar::<_, String>(
        "SELECT COALESCE(u.scrape_frequency_override, p.default_frequency, 'manual') \
         FROM user_advertisers ua \
         JOIN users u ON u.id = ua.user_id \
         LEFT JOIN plans p ON p.id = u.plan_id \
         WHERE ua.advertiser_id = $1 AND ua.status = 'following'",
    )
    .bind(advertiser_id)
    .fetch_all(pool)
    .await?;

    raw.iter()
        .map(|value| ScrapeFrequency::try_from(value.as_str()).map_err(DbError::from))
        .collect()
}

/// Effective frequency for a single user.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not exist,
/// [`DbError::InvalidColumn`] for an unknown stored tier, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_user_effective_frequency(
    pool: &PgPool,
    user_id: i64,
) -> Result<ScrapeFrequency, DbError> {
    let raw = sqlx::query_scalar::<_, String>(
        "SELECT COALESCE(u.scrape_frequency_override, p.default_frequency, 'manual') \
         FROM users u \
         LEFT JOIN plans p ON p.id = u.plan_id \
         WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(ScrapeFrequency::try_from(raw.as_str())?)
}

/// Plan limits and live counts for a user. A user without a plan is unlimited.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_user_usage(pool: &PgPool, user_id: i64) -> Result<UserUsage, DbError> {
    sqlx::query_as::<_, UserUsage>(
        "SELECT p.max_followed, \
                p.max_tracked, \
                (SELECT COUNT(*) FROM user_advertisers ua \
                  WHERE ua.user_id = u.id AND ua.status = 'following') AS followed_count, \
                (SELECT COUNT(*) FROM user_advertisers ua \
                  WHERE ua.user_id = u.id AND ua.status <> 'archived') AS tracked_count \
         FROM users u \
         LEFT JOIN plans p ON p.id = u.plan_id \
         WHERE u.id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
