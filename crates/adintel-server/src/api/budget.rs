use adintel_sync::{check_budget, month_bounds};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct BudgetItem {
    ok: bool,
    current_spend: Decimal,
    limit: Decimal,
    remaining: Decimal,
    month_start: DateTime<Utc>,
    month_end: DateTime<Utc>,
}

pub(super) async fn get_budget(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<BudgetItem>>, ApiError> {
    let status = check_budget(&state.pool, state.settings.monthly_budget_usd)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let (month_start, month_end) = month_bounds(Utc::now());

    Ok(Json(ApiResponse {
        data: BudgetItem {
            ok: status.ok,
            current_spend: status.current_spend.round_dp(2),
            limit: status.limit,
            remaining: (status.limit - status.current_spend).max(Decimal::ZERO).round_dp(2),
            month_start,
            month_end,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
