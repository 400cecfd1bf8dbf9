use adintel_core::{JobType, RunStatus};
use adintel_db::{ScrapeRunFilter, ScrapeRunRow};
use adintel_sync::SyncOutcome;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_sync_error, normalize_limit, require_provider, ApiError, ApiResponse,
    AppState, ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct ScrapeRunsQuery {
    pub advertiser_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StartRunQuery {
    pub job_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ScrapeRunItem {
    id: i64,
    public_id: Uuid,
    advertiser_id: i64,
    status: String,
    job_type: String,
    external_run_id: Option<String>,
    external_dataset_id: Option<String>,
    ads_found: i32,
    ads_new: Option<i32>,
    ads_updated: Option<i32>,
    cost_usd: Option<Decimal>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl From<ScrapeRunRow> for ScrapeRunItem {
    fn from(row: ScrapeRunRow) -> Self {
        let cost_usd = row.cost_usd_rounded();
        Self {
            id: row.id,
            public_id: row.public_id,
            advertiser_id: row.advertiser_id,
            status: row.status,
            job_type: row.job_type,
            external_run_id: row.external_run_id,
            external_dataset_id: row.external_dataset_id,
            ads_found: row.ads_found,
            ads_new: row.ads_new,
            ads_updated: row.ads_updated,
            cost_usd,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
        }
    }
}

fn validation_error(request_id: &str, e: &adintel_core::CoreError) -> ApiError {
    ApiError::new(request_id, "validation_error", e.to_string())
}

fn parse_status(request_id: &str, raw: Option<&str>) -> Result<Option<RunStatus>, ApiError> {
    raw.map(|s| RunStatus::try_from(s).map_err(|e| validation_error(request_id, &e)))
        .transpose()
}

/// `job_type` defaults to `initial`.
fn parse_job_type(request_id: &str, raw: Option<&str>) -> Result<JobType, ApiError> {
    raw.map_or(Ok(JobType::Initial), |s| {
        JobType::try_from(s).map_err(|e| validation_error(request_id, &e))
    })
}

pub(super) async fn list_scrape_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ScrapeRunsQuery>,
) -> Result<Json<ApiResponse<Vec<ScrapeRunItem>>>, ApiError> {
    let status = parse_status(&req_id.0, query.status.as_deref())?;
    let filter = ScrapeRunFilter {
        advertiser_id: query.advertiser_id,
        status,
        limit: normalize_limit(query.limit),
    };
    let rows = adintel_db::list_scrape_runs(&state.pool, &filter)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(ScrapeRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn start_scrape_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(advertiser_id): Path<i64>,
    Query(query): Query<StartRunQuery>,
) -> Result<(StatusCode, Json<ApiResponse<ScrapeRunItem>>), ApiError> {
    let job_type = parse_job_type(&req_id.0, query.job_type.as_deref())?;
    let provider = require_provider(&state, &req_id.0)?;

    let run = adintel_sync::start_scrape_run(
        &state.pool,
        &provider,
        &state.settings,
        advertiser_id,
        job_type,
    )
    .await
    .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: ScrapeRunItem::from(run),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// One synchronizer step. `data` is `null` for a run without a provider run id.
pub(super) async fn sync_scrape_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(run_id): Path<i64>,
) -> Result<Json<ApiResponse<Option<SyncOutcome>>>, ApiError> {
    let provider = require_provider(&state, &req_id.0)?;

    let outcome = adintel_sync::sync_scrape_run(&state.pool, &provider, &state.settings, run_id)
        .await
        .map_err(|e| map_sync_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: outcome,
        meta: ResponseMeta::new(req_id.0),
    }))
}
