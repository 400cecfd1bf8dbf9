mod budget;
mod cron;
mod follows;
mod scrape_runs;

use std::sync::Arc;
use std::time::Duration;

use adintel_provider::ProviderClient;
use adintel_sync::{FollowError, SyncError, SyncSettings};
use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// `None` when no provider token is configured; start and sync routes
    /// then answer 503.
    pub provider: Option<Arc<ProviderClient>>,
    pub settings: Arc<SyncSettings>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
    provider: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "budget_exceeded" => StatusCode::PAYMENT_REQUIRED,
            "conflict"
            | "already_tracked"
            | "not_tracked"
            | "invalid_transition"
            | "manual_plan"
            | "follow_limit_reached"
            | "advertiser_limit_reached" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "provider_error" => StatusCode::BAD_GATEWAY,
            "provider_not_configured" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &adintel_db::DbError) -> ApiError {
    if matches!(error, adintel_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_sync_error(request_id: String, error: &SyncError) -> ApiError {
    match error {
        SyncError::Db(e) => map_db_error(request_id, e),
        SyncError::BudgetExceeded { .. } => {
            ApiError::new(request_id, "budget_exceeded", error.to_string())
        }
        SyncError::Provider(adintel_provider::ProviderError::MissingTarget) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        SyncError::Provider(e) => {
            tracing::error!(error = %e, "scrape provider call failed");
            ApiError::new(request_id, "provider_error", error.to_string())
        }
    }
}

pub(super) fn map_follow_error(request_id: String, error: &FollowError) -> ApiError {
    match error {
        FollowError::Db(e) => map_db_error(request_id, e),
        other => ApiError::new(request_id, other.code(), other.to_string()),
    }
}

/// The configured provider, or a 503 when none is.
pub(super) fn require_provider(
    state: &AppState,
    request_id: &str,
) -> Result<Arc<ProviderClient>, ApiError> {
    state.provider.clone().ok_or_else(|| {
        ApiError::new(
            request_id,
            "provider_not_configured",
            "APIFY_TOKEN is not configured",
        )
    })
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

/// Cron sweeps sit behind bearer auth only. The scheduler calls them on a
/// fixed cadence, so they never count against a caller's request window.
fn cron_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/cron/sync-running", post(cron::sync_running))
        .route("/api/v1/cron/start-due", post(cron::start_due))
        .layer(axum::middleware::from_fn_with_state(auth, require_bearer_auth))
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/budget", get(budget::get_budget))
        .route("/api/v1/scrape-runs", get(scrape_runs::list_scrape_runs))
        .route(
            "/api/v1/scrape-runs/{run_id}/sync",
            get(scrape_runs::sync_scrape_run),
        )
        .route(
            "/api/v1/advertisers/{advertiser_id}/scrape-runs",
            post(scrape_runs::start_scrape_run),
        )
        .route("/api/v1/users/{user_id}/limits", get(follows::get_limits))
        .route(
            "/api/v1/users/{user_id}/advertisers/{advertiser_id}",
            post(follows::add_advertiser).delete(follows::remove_advertiser),
        )
        .route(
            "/api/v1/users/{user_id}/advertisers/{advertiser_id}/follow",
            post(follows::follow_advertiser),
        )
        .route(
            "/api/v1/users/{user_id}/advertisers/{advertiser_id}/unfollow",
            post(follows::unfollow_advertiser),
        )
        .route(
            "/api/v1/users/{user_id}/advertisers/{advertiser_id}/refollow",
            post(follows::refollow_advertiser),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(cron_router(auth.clone()))
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);
    let provider = if state.provider.is_some() {
        "configured"
    } else {
        "not_configured"
    };

    match adintel_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                    provider,
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                        provider,
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}
