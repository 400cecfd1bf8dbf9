//! Database operations for `user_advertisers` (follow links).
//!
//! Status changes go through [`transition_user_advertiser`], which only
//! succeeds when the row is still in the expected status. A concurrent
//! writer that got there first turns the second call into
//! [`DbError::InvalidTransition`].

use adintel_core::FollowStatus;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

const USER_ADVERTISER_COLUMNS: &str = "id, user_id, advertiser_id, status, first_tracked_at, \
     next_scrape_at, created_at, updated_at";

/// A row from the `user_advertisers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserAdvertiserRow {
    pub id: i64,
    pub user_id: i64,
    pub advertiser_id: i64,
    pub status: String,
    pub first_tracked_at: DateTime<Utc>,
    /// Per-user schedule hint; set while following, cleared otherwise.
    pub next_scrape_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAdvertiserRow {
    /// Decoded `status` column.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidColumn`] if the stored value is not a known status.
    pub fn follow_status(&self) -> Result<FollowStatus, DbError> {
        Ok(FollowStatus::try_from(self.status.as_str())?)
    }
}

/// Fetches the link between `user_id` and `advertiser_id`, if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_advertiser(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
) -> Result<Option<UserAdvertiserRow>, DbError> {
    let row = sqlx::query_as::<_, UserAdvertiserRow>(&format!(
        "SELECT {USER_ADVERTISER_COLUMNS} FROM user_advertisers \
         WHERE user_id = $1 AND advertiser_id = $2"
    ))
    .bind(user_id)
    .bind(advertiser_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Creates a link in `status`. Returns `None` when the pair already exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including unknown user or
/// advertiser ids).
pub async fn insert_user_advertiser(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
    status: FollowStatus,
    next_scrape_at: Option<DateTime<Utc>>,
) -> Result<Option<UserAdvertiserRow>, DbError> {
    let row = sqlx::query_as::<_, UserAdvertiserRow>(&format!(
        "INSERT INTO user_advertisers (user_id, advertiser_id, status, next_scrape_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id, advertiser_id) DO NOTHING \
         RETURNING {USER_ADVERTISER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(advertiser_id)
    .bind(status.as_str())
    .bind(next_scrape_at)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Moves a link from `from` to `to` and overwrites its `next_scrape_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if no link exists in status `from`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn transition_user_advertiser(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
    from: FollowStatus,
    to: FollowStatus,
    next_scrape_at: Option<DateTime<Utc>>,
) -> Result<UserAdvertiserRow, DbError> {
    sqlx::query_as::<_, UserAdvertiserRow>(&format!(
        "UPDATE user_advertisers \
         SET status = $4, next_scrape_at = $5, updated_at = NOW() \
         WHERE user_id = $1 AND advertiser_id = $2 AND status = $3 \
         RETURNING {USER_ADVERTISER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(advertiser_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(next_scrape_at)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidTransition {
        entity: "user advertiser",
        id: advertiser_id,
        expected_status: from.as_str(),
    })
}

/// Copies the advertiser's shared `next_scrape_at` onto a `following` link.
/// Returns `false` if the link is not currently `following`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_follower_next_scrape(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
    next_scrape_at: Option<DateTime<Utc>>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE user_advertisers \
         SET next_scrape_at = $3, updated_at = NOW() \
         WHERE user_id = $1 AND advertiser_id = $2 AND status = 'following'",
    )
    .bind(user_id)
    .bind(advertiser_id)
    .bind(next_scrape_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a non-archived link. Returns `false` if there was nothing to delete.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_user_advertiser(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "DELETE FROM user_advertisers \
         WHERE user_id = $1 AND advertiser_id = $2 AND status <> 'archived'",
    )
    .bind(user_id)
    .bind(advertiser_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
