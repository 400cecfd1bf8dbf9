//! Follow state machine.
//!
//! `added → following → archived → following`, and any non-archived link can
//! be removed. Limit and plan checks run before the first write. Every change
//! to the follower set is followed by [`recalculate_schedule`].

use adintel_core::FollowStatus;
use adintel_db::{
    delete_user_advertiser, get_advertiser, get_user_advertiser, get_user_effective_frequency,
    get_user_usage, insert_user_advertiser, set_follower_next_scrape, transition_user_advertiser,
    DbError, UserAdvertiserRow,
};
use serde::Serialize;
use sqlx::PgPool;

use crate::reconciler::recalculate_schedule;
use crate::FollowError;

/// Result of a plan limit check. `limit` is `None` for unlimited plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitCheck {
    pub allowed: bool,
    pub used: i64,
    pub limit: Option<i64>,
}

impl LimitCheck {
    fn new(used: i64, limit: Option<i32>) -> Self {
        let limit = limit.map(i64::from);
        Self {
            allowed: limit.is_none_or(|max| used < max),
            used,
            limit,
        }
    }
}

/// Whether `user_id` may follow one more advertiser.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not exist.
pub async fn can_follow(pool: &PgPool, user_id: i64) -> Result<LimitCheck, DbError> {
    let usage = get_user_usage(pool, user_id).await?;
    Ok(LimitCheck::new(usage.followed_count, usage.max_followed))
}

/// Whether `user_id` may track one more advertiser. Archived links do not
/// count.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not exist.
pub async fn can_add(pool: &PgPool, user_id: i64) -> Result<LimitCheck, DbError> {
    let usage = get_user_usage(pool, user_id).await?;
    Ok(LimitCheck::new(usage.tracked_count, usage.max_tracked))
}

/// Links an advertiser to a user in `added` status. Does not schedule
/// anything; only following does.
///
/// # Errors
///
/// [`FollowError::AlreadyTracked`] if any link already exists,
/// [`FollowError::AdvertiserLimitReached`] if the plan is full.
pub async fn add_advertiser(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
) -> Result<UserAdvertiserRow, FollowError> {
    if get_user_advertiser(pool, user_id, advertiser_id)
        .await?
        .is_some()
    {
        return Err(FollowError::AlreadyTracked { advertiser_id });
    }

    let check = can_add(pool, user_id).await?;
    if !check.allowed {
        return Err(FollowError::AdvertiserLimitReached {
            used: check.used,
            limit: check.limit.unwrap_or_default(),
        });
    }

    let row = insert_user_advertiser(pool, user_id, advertiser_id, FollowStatus::Added, None)
        .await?
        .ok_or(FollowError::AlreadyTracked { advertiser_id })?;

    tracing::info!(user_id, advertiser_id, "advertiser added");
    Ok(row)
}

/// `added → following`.
///
/// # Errors
///
/// [`FollowError::NotTracked`], [`FollowError::InvalidTransition`],
/// [`FollowError::ManualPlan`] or [`FollowError::FollowLimitReached`], all
/// before any write.
pub async fn follow(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
) -> Result<UserAdvertiserRow, FollowError> {
    start_following(pool, user_id, advertiser_id, FollowStatus::Added).await
}

/// `archived → following`. Same checks as [`follow`].
///
/// # Errors
///
/// Same as [`follow`].
pub async fn refollow(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
) -> Result<UserAdvertiserRow, FollowError> {
    start_following(pool, user_id, advertiser_id, FollowStatus::Archived).await
}

/// `following → archived`. Clears the user's copy of the schedule.
///
/// # Errors
///
/// [`FollowError::NotTracked`] or [`FollowError::InvalidTransition`].
pub async fn unfollow(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
) -> Result<UserAdvertiserRow, FollowError> {
    expect_status(pool, user_id, advertiser_id, FollowStatus::Following).await?;

    let row = transition_user_advertiser(
        pool,
        user_id,
        advertiser_id,
        FollowStatus::Following,
        FollowStatus::Archived,
        None,
    )
    .await
    .map_err(|e| transition_error(e, advertiser_id))?;

    recalculate_schedule(pool, advertiser_id).await?;
    tracing::info!(user_id, advertiser_id, "advertiser unfollowed");
    Ok(row)
}

/// Deletes an `added` or `following` link.
///
/// # Errors
///
/// [`FollowError::NotTracked`] if there is no link,
/// [`FollowError::InvalidTransition`] if it is archived.
pub async fn remove(pool: &PgPool, user_id: i64, advertiser_id: i64) -> Result<(), FollowError> {
    let link = get_user_advertiser(pool, user_id, advertiser_id)
        .await?
        .ok_or(FollowError::NotTracked { advertiser_id })?;
    if link.follow_status()? == FollowStatus::Archived {
        return Err(FollowError::InvalidTransition {
            advertiser_id,
            expected: "added or following",
            actual: link.status,
        });
    }

    if !delete_user_advertiser(pool, user_id, advertiser_id).await? {
        return Err(FollowError::NotTracked { advertiser_id });
    }

    recalculate_schedule(pool, advertiser_id).await?;
    tracing::info!(user_id, advertiser_id, "advertiser removed");
    Ok(())
}

async fn start_following(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
    from: FollowStatus,
) -> Result<UserAdvertiserRow, FollowError> {
    expect_status(pool, user_id, advertiser_id, from).await?;

    let frequency = get_user_effective_frequency(pool, user_id).await?;
    if frequency.interval_days().is_none() {
        return Err(FollowError::ManualPlan);
    }

    let check = can_follow(pool, user_id).await?;
    if !check.allowed {
        return Err(FollowError::FollowLimitReached {
            used: check.used,
            limit: check.limit.unwrap_or_default(),
        });
    }

    let mut row = transition_user_advertiser(
        pool,
        user_id,
        advertiser_id,
        from,
        FollowStatus::Following,
        None,
    )
    .await
    .map_err(|e| transition_error(e, advertiser_id))?;

    recalculate_schedule(pool, advertiser_id).await?;

    let advertiser = get_advertiser(pool, advertiser_id).await?;
    if set_follower_next_scrape(pool, user_id, advertiser_id, advertiser.next_scrape_at).await? {
        row.next_scrape_at = advertiser.next_scrape_at;
    }

    tracing::info!(
        user_id,
        advertiser_id,
        %frequency,
        next_scrape_at = ?advertiser.next_scrape_at,
        "advertiser followed"
    );
    Ok(row)
}

async fn expect_status(
    pool: &PgPool,
    user_id: i64,
    advertiser_id: i64,
    expected: FollowStatus,
) -> Result<(), FollowError> {
    let link = get_user_advertiser(pool, user_id, advertiser_id)
        .await?
        .ok_or(FollowError::NotTracked { advertiser_id })?;
    if link.follow_status()? != expected {
        return Err(FollowError::InvalidTransition {
            advertiser_id,
            expected: expected.as_str(),
            actual: link.status,
        });
    }
    Ok(())
}

/// A conditional update that matched nothing lost a race with another writer.
fn transition_error(err: DbError, advertiser_id: i64) -> FollowError {
    match err {
        DbError::InvalidTransition {
            expected_status, ..
        } => FollowError::InvalidTransition {
            advertiser_id,
            expected: expected_status,
            actual: "changed concurrently".to_string(),
        },
        other => FollowError::Db(other),
    }
}
