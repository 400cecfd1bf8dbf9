//! Wire types for the scrape provider API.
//!
//! ## Observed shape
//!
//! Every JSON endpoint except dataset items wraps its payload in a `data`
//! envelope. Run objects carry `id`, an upper-case `status` and
//! `defaultDatasetId`. The dataset id is normally present from the first
//! response but may be `null` until the actor allocates storage, so it is
//! modelled as optional.
//!
//! Dataset items are returned as a bare JSON array with no envelope.

use adintel_core::ProviderRunStatus;
use serde::{Deserialize, Serialize};

/// `{"data": …}` envelope used by run endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub data: T,
}

/// Run object returned by `POST /acts/{actor}/runs` and `GET /actor-runs/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunData {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub default_dataset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartUrl {
    pub url: String,
}

/// Actor input for the LinkedIn ad library scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperInput {
    pub start_urls: Vec<StartUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_limit: Option<u32>,
}

/// What a run should scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeTarget {
    /// Explicit ad library URLs; always preferred over a company id.
    StartUrls(Vec<String>),
    /// Numeric LinkedIn company id.
    CompanyId(String),
}

/// Everything needed to start one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    pub target: ScrapeTarget,
    pub results_limit: Option<u32>,
}

impl ScrapeConfig {
    /// Builds a config from optional advertiser overrides.
    ///
    /// Non-empty `start_urls` win; otherwise `company_id` is used. Returns
    /// `None` when neither is usable.
    #[must_use]
    pub fn from_parts(
        start_urls: Option<&[String]>,
        company_id: Option<&str>,
        results_limit: Option<u32>,
    ) -> Option<Self> {
        let urls: Vec<String> = start_urls
            .unwrap_or_default()
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_owned)
            .collect();

        let target = if !urls.is_empty() {
            ScrapeTarget::StartUrls(urls)
        } else {
            let id = company_id.map(str::trim).filter(|id| !id.is_empty())?;
            ScrapeTarget::CompanyId(id.to_owned())
        };

        Some(Self {
            target,
            results_limit,
        })
    }
}

/// Identifiers of a freshly started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    /// `None` until the provider allocates a dataset.
    pub dataset_id: Option<String>,
}

/// Current state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatusInfo {
    pub status: ProviderRunStatus,
    pub dataset_id: Option<String>,
}
