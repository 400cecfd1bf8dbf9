//! HTTP client for the scrape provider (an Apify-style actor API).
//!
//! Three calls make up the whole contract: start a run, read a run's status,
//! and read the items its dataset holds right now. Datasets fill
//! incrementally, so items can be read while the run is still going.

use std::time::Duration;

use adintel_core::{AppConfig, ProviderRunStatus};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::retry::retry_with_backoff;
use crate::types::{
    ApiResponse, RunData, RunInfo, RunStatusInfo, ScrapeConfig, ScrapeTarget, ScraperInput,
    StartUrl,
};

pub const DEFAULT_BASE_URL: &str = "https://api.apify.com/v2";
pub const DEFAULT_ACTOR_ID: &str = "silva95gustavo~linkedin-ad-library-scraper";

const AD_LIBRARY_SEARCH_URL: &str = "https://www.linkedin.com/ad-library/search";

/// Client for the scrape provider API.
///
/// Use [`ProviderClient::new`] for production or
/// [`ProviderClient::with_base_url`] to point at a mock server in tests.
#[derive(Debug)]
pub struct ProviderClient {
    client: Client,
    token: String,
    base_url: String,
    actor_id: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ProviderClient {
    /// Creates a client pointed at the production API and default actor.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(token: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Self::with_base_url(token, timeout_secs, DEFAULT_BASE_URL, DEFAULT_ACTOR_ID, 3, 1_000)
    }

    /// Creates a client with a custom base URL, actor and retry policy.
    ///
    /// `max_retries` applies to status and dataset reads only.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ProviderError::InvalidBaseUrl`] if
    /// `base_url` is not an absolute http(s) URL.
    pub fn with_base_url(
        token: &str,
        timeout_secs: u64,
        base_url: &str,
        actor_id: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, ProviderError> {
        let parsed = Url::parse(base_url).map_err(|e| ProviderError::InvalidBaseUrl {
            base_url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidBaseUrl {
                base_url: base_url.to_owned(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("adintel/0.1 (ad-library-sync)")
            .build()?;

        Ok(Self {
            client,
            token: token.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            actor_id: actor_id.to_owned(),
            max_retries,
            backoff_base_ms,
        })
    }

    /// Builds a client from application config. Returns `Ok(None)` when no
    /// provider token is configured.
    ///
    /// # Errors
    ///
    /// Same as [`ProviderClient::with_base_url`].
    pub fn from_app_config(config: &AppConfig) -> Result<Option<Self>, ProviderError> {
        let Some(token) = config.provider_token.as_deref() else {
            return Ok(None);
        };
        Self::with_base_url(
            token,
            config.provider_timeout_secs,
            &config.provider_base_url,
            &config.provider_actor_id,
            config.provider_max_retries,
            config.provider_retry_backoff_ms,
        )
        .map(Some)
    }

    /// Starts a run for `config`. Never retried.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on a non-2xx response.
    /// - [`ProviderError::Http`] on network failure.
    /// - [`ProviderError::Deserialize`] if the body is not a run object.
    pub async fn start_run(&self, config: &ScrapeConfig) -> Result<RunInfo, ProviderError> {
        let input = build_input(config);
        let url = format!("{}/acts/{}/runs", self.base_url, self.actor_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&input)
            .send()
            .await?;
        let run: RunData = read_envelope(response, "start run").await?;

        tracing::info!(
            run_id = %run.id,
            dataset_id = ?run.default_dataset_id,
            status = %run.status,
            "provider run started"
        );

        Ok(RunInfo {
            run_id: run.id,
            dataset_id: run.default_dataset_id,
        })
    }

    /// Reads the current status and dataset id of a run.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on a non-2xx response after retries.
    /// - [`ProviderError::Http`] on network failure after retries.
    /// - [`ProviderError::Deserialize`] if the body is not a run object.
    pub async fn get_run_status(&self, run_id: &str) -> Result<RunStatusInfo, ProviderError> {
        let url = format!("{}/actor-runs/{run_id}", self.base_url);
        let context = format!("run status ({run_id})");

        let (url, context) = (url.as_str(), context.as_str());

        let run: RunData =
            retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
                let response = self
                    .client
                    .get(url)
                    .bearer_auth(&self.token)
                    .send()
                    .await?;
                read_envelope(response, context).await
            })
            .await?;

        Ok(RunStatusInfo {
            status: ProviderRunStatus::parse(&run.status),
            dataset_id: run.default_dataset_id,
        })
    }

    /// Reads every item the dataset currently holds, in dataset order.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Api`] on a non-2xx response after retries.
    /// - [`ProviderError::Http`] on network failure after retries.
    /// - [`ProviderError::Deserialize`] if the body is not an array of `T`.
    pub async fn get_dataset_items<T: DeserializeOwned>(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<T>, ProviderError> {
        let url = format!("{}/datasets/{dataset_id}/items", self.base_url);
        let context = format!("dataset items ({dataset_id})");

        let (url, context) = (url.as_str(), context.as_str());

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || async move {
            let response = self
                .client
                .get(url)
                .query(&[("format", "json")])
                .bearer_auth(&self.token)
                .send()
                .await?;
            read_json(response, context).await
        })
        .await
    }
}

/// Ad library search URL for one company.
#[must_use]
pub fn company_search_url(company_id: &str) -> String {
    format!("{AD_LIBRARY_SEARCH_URL}?companyIds={company_id}")
}

fn build_input(config: &ScrapeConfig) -> ScraperInput {
    let start_urls = match &config.target {
        ScrapeTarget::StartUrls(urls) => urls
            .iter()
            .map(|url| StartUrl { url: url.clone() })
            .collect(),
        ScrapeTarget::CompanyId(id) => vec![StartUrl {
            url: company_search_url(id),
        }],
    };
    ScraperInput {
        start_urls,
        results_limit: config.results_limit,
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| ProviderError::Deserialize {
        context: context.to_owned(),
        source,
    })
}

async fn read_envelope<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, ProviderError> {
    let envelope: ApiResponse<T> = read_json(response, context).await?;
    Ok(envelope.data)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
