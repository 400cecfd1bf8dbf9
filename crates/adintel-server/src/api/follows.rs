use adintel_db::UserAdvertiserRow;
use adintel_sync::LimitCheck;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, map_follow_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct FollowLinkItem {
    user_id: i64,
    advertiser_id: i64,
    status: String,
    first_tracked_at: DateTime<Utc>,
    next_scrape_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<UserAdvertiserRow> for FollowLinkItem {
    fn from(row: UserAdvertiserRow) -> Self {
        Self {
            user_id: row.user_id,
            advertiser_id: row.advertiser_id,
            status: row.status,
            first_tracked_at: row.first_tracked_at,
            next_scrape_at: row.next_scrape_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct UserLimitsItem {
    follow: LimitCheck,
    add: LimitCheck,
}

type LinkResponse = Result<Json<ApiResponse<FollowLinkItem>>, ApiError>;

fn link_response(req_id: RequestId, row: UserAdvertiserRow) -> Json<ApiResponse<FollowLinkItem>> {
    Json(ApiResponse {
        data: FollowLinkItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    })
}

pub(super) async fn get_limits(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<UserLimitsItem>>, ApiError> {
    let follow = adintel_sync::can_follow(&state.pool, user_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let add = adintel_sync::can_add(&state.pool, user_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: UserLimitsItem { follow, add },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn add_advertiser(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, advertiser_id)): Path<(i64, i64)>,
) -> Result<(StatusCode, Json<ApiResponse<FollowLinkItem>>), ApiError> {
    let row = adintel_sync::add_advertiser(&state.pool, user_id, advertiser_id)
        .await
        .map_err(|e| map_follow_error(req_id.0.clone(), &e))?;
    Ok((StatusCode::CREATED, link_response(req_id, row)))
}

pub(super) async fn follow_advertiser(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, advertiser_id)): Path<(i64, i64)>,
) -> LinkResponse {
    let row = adintel_sync::follow(&state.pool, user_id, advertiser_id)
        .await
        .map_err(|e| map_follow_error(req_id.0.clone(), &e))?;
    Ok(link_response(req_id, row))
}

pub(super) async fn unfollow_advertiser(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, advertiser_id)): Path<(i64, i64)>,
) -> LinkResponse {
    let row = adintel_sync::unfollow(&state.pool, user_id, advertiser_id)
        .await
        .map_err(|e| map_follow_error(req_id.0.clone(), &e))?;
    Ok(link_response(req_id, row))
}

pub(super) async fn refollow_advertiser(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, advertiser_id)): Path<(i64, i64)>,
) -> LinkResponse {
    let row = adintel_sync::refollow(&state.pool, user_id, advertiser_id)
        .await
        .map_err(|e| map_follow_error(req_id.0.clone(), &e))?;
    Ok(link_response(req_id, row))
}

pub(super) async fn remove_advertiser(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((user_id, advertiser_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    adintel_sync::remove(&state.pool, user_id, advertiser_id)
        .await
        .map_err(|e| map_follow_error(req_id.0, &e))?;
    Ok(StatusCode::NO_CONTENT)
}
