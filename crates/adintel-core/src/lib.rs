pub mod ads;
pub mod app_config;
pub mod config;
pub mod scrape;

use thiserror::Error;

pub use ads::{
    AdFormat, AdMedia, ArticleMedia, CarouselMedia, CarouselSlide, DocumentMedia, EventMedia,
    FollowCompanyMedia, ImageMedia, JobMedia, MessageMedia, SpotlightMedia, TextMedia,
    TransformedAd, VideoMedia,
};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use scrape::{FollowStatus, JobType, ProviderRunStatus, RunStatus, ScrapeFrequency};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid {kind}: {value}")]
    InvalidEnumValue { kind: &'static str, value: String },
}
