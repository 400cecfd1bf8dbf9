//! Sweep endpoints for an external cron caller. The in-process scheduler
//! runs the same sweeps.

use adintel_sync::{BatchSyncSummary, StartDueSummary};
use axum::{extract::State, Extension, Json};

use crate::middleware::RequestId;

use super::{map_db_error, require_provider, ApiError, ApiResponse, AppState, ResponseMeta};

pub(super) async fn sync_running(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<BatchSyncSummary>>, ApiError> {
    let provider = require_provider(&state, &req_id.0)?;

    let summary = adintel_sync::sync_all_running(&state.pool, &provider, &state.settings)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn start_due(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<StartDueSummary>>, ApiError> {
    let provider = require_provider(&state, &req_id.0)?;

    let summary = adintel_sync::start_due_advertisers(&state.pool, &provider, &state.settings)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: summary,
        meta: ResponseMeta::new(req_id.0),
    }))
}
