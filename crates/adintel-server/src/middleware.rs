use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Who made an authenticated request. Set by [`require_bearer_auth`] and used
/// to key rate-limit windows, so one cron caller cannot starve another key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caller {
    /// Index of the matched key in the configured key list.
    Key(usize),
    /// Auth disabled (development without keys).
    Open,
}

/// Bearer keys accepted on protected and cron routes.
#[derive(Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl AuthState {
    /// Reads comma-separated bearer tokens from `ADINTEL_API_KEYS`.
    ///
    /// # Errors
    ///
    /// Fails outside development when no key is configured.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("ADINTEL_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Same as [`AuthState::from_env`] with the key list passed in. Without
    /// keys, auth is disabled in development and an error elsewhere.
    ///
    /// # Errors
    ///
    /// Fails outside development when `raw` holds no key.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        keys.sort();
        keys.dedup();

        if keys.is_empty() {
            if !is_development {
                anyhow::bail!("ADINTEL_API_KEYS is required outside development");
            }
            tracing::warn!("ADINTEL_API_KEYS not set; bearer auth disabled");
        }

        Ok(Self {
            enabled: !keys.is_empty(),
            api_keys: Arc::new(keys),
        })
    }

    /// The caller a token identifies. Every key is compared in constant time.
    fn identify(&self, token: &str) -> Option<Caller> {
        let mut found = Choice::from(0);
        let mut index = 0_u64;
        for (i, key) in self.api_keys.iter().enumerate() {
            let matched = key.as_bytes().ct_eq(token.as_bytes());
            index.conditional_assign(&(i as u64), matched);
            found |= matched;
        }
        bool::from(found)
            .then(|| usize::try_from(index).ok().map(Caller::Key))
            .flatten()
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request limit, tracked separately per [`Caller`].
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<Caller, RateLimitWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request for `caller`. Returns the time left in the window
    /// when the caller is over its limit.
    async fn admit(&self, caller: Caller, now: Instant) -> Result<(), Duration> {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(caller).or_insert(RateLimitWindow {
            started_at: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(window.started_at);
        if elapsed >= self.window {
            *window = RateLimitWindow {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            return Err(self.window.saturating_sub(elapsed));
        }
        window.count += 1;
        Ok(())
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone())
}

/// Accepts a caller-supplied request id when it is short printable ASCII;
/// otherwise generates a `UUIDv4`. The id is stored as a [`RequestId`]
/// extension and echoed in the `x-request-id` response header.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Rejects requests without a configured bearer key and tags the rest with
/// their [`Caller`].
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        req.extensions_mut().insert(Caller::Open);
        return next.run(req).await;
    }

    let caller = extract_bearer_token(req.headers().get(header::AUTHORIZATION))
        .and_then(|token| auth.identify(token));
    let Some(caller) = caller else {
        tracing::warn!(path = %req.uri().path(), "rejected request without a valid bearer key");
        return ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid bearer token",
        )
        .into_response();
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

/// Applies the per-caller window. Must run inside [`require_bearer_auth`].
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let caller = req
        .extensions()
        .get::<Caller>()
        .copied()
        .unwrap_or(Caller::Open);

    match rate_limit.admit(caller, Instant::now()).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::warn!(?caller, retry_after_secs = retry_after.as_secs(), "rate limited");
            let mut res =
                ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
                    .into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, value);
            }
            res
        }
    }
}

/// Token from an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    let raw = value?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
