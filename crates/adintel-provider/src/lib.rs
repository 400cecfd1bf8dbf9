pub mod client;
pub mod error;
pub mod impressions;
pub mod normalize;
pub(crate) mod retry;
pub mod types;

pub use client::{company_search_url, ProviderClient, DEFAULT_ACTOR_ID, DEFAULT_BASE_URL};
pub use error::ProviderError;
pub use impressions::{normalize_impressions, parse_impressions};
pub use normalize::{company_id_from_url, transform_ad};
pub use types::{RunInfo, RunStatusInfo, ScrapeConfig, ScrapeTarget, ScraperInput, StartUrl};
