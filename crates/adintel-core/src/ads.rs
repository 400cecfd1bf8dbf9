//! Normalized ad shapes produced by the transformer and persisted by the
//! storage engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// LinkedIn ad format tag.
///
/// Provider tags arrive as `SINGLE_IMAGE`, `single-image`, `Single Image`, etc.;
/// [`AdFormat::parse`] folds them all to the snake_case column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdFormat {
    SingleImage,
    Video,
    Carousel,
    Document,
    Event,
    Message,
    Spotlight,
    Text,
    Job,
    Article,
    FollowCompany,
    /// A tag this crate does not model. Stored as-is (normalized), no media.
    Other(String),
}

impl AdFormat {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match key.as_str() {
            "single_image" | "image" => AdFormat::SingleImage,
            "video" => AdFormat::Video,
            "carousel" => AdFormat::Carousel,
            "document" => AdFormat::Document,
            "event" => AdFormat::Event,
            "message" | "conversation" => AdFormat::Message,
            "spotlight" => AdFormat::Spotlight,
            "text" => AdFormat::Text,
            "job" => AdFormat::Job,
            "article" => AdFormat::Article,
            "follow_company" => AdFormat::FollowCompany,
            _ => AdFormat::Other(key),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            AdFormat::SingleImage => "single_image",
            AdFormat::Video => "video",
            AdFormat::Carousel => "carousel",
            AdFormat::Document => "document",
            AdFormat::Event => "event",
            AdFormat::Message => "message",
            AdFormat::Spotlight => "spotlight",
            AdFormat::Text => "text",
            AdFormat::Job => "job",
            AdFormat::Article => "article",
            AdFormat::FollowCompany => "follow_company",
            AdFormat::Other(raw) => raw,
        }
    }
}

impl fmt::Display for AdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format-specific structured media, stored as `JSONB` in `ads.media`.
///
/// The `format` tag duplicates `ads.format` so the payload is self-describing
/// when read back without the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum AdMedia {
    SingleImage(ImageMedia),
    Video(VideoMedia),
    Carousel(CarouselMedia),
    Document(DocumentMedia),
    Event(EventMedia),
    Message(MessageMedia),
    Spotlight(SpotlightMedia),
    Text(TextMedia),
    Job(JobMedia),
    Article(ArticleMedia),
    FollowCompany(FollowCompanyMedia),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMedia {
    pub image_url: Option<String>,
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMedia {
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarouselSlide {
    pub image_url: Option<String>,
    pub title: Option<String>,
    pub link_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarouselMedia {
    pub slides: Vec<CarouselSlide>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMedia {
    pub document_url: Option<String>,
    pub title: Option<String>,
    pub cover_image_url: Option<String>,
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMedia {
    pub name: Option<String>,
    pub starts_at: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub event_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMedia {
    pub sender_name: Option<String>,
    pub sender_image_url: Option<String>,
    pub subject: Option<String>,
    pub buttons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotlightMedia {
    pub image_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextMedia {
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMedia {
    pub job_title: Option<String>,
    pub location: Option<String>,
    pub company_logo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleMedia {
    pub title: Option<String>,
    pub article_url: Option<String>,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowCompanyMedia {
    pub company_name: Option<String>,
    pub logo_url: Option<String>,
    pub follower_count: Option<i64>,
}

/// One ad normalized for storage, keyed globally by `external_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedAd {
    /// LinkedIn ad library id, stored as a string to avoid precision loss.
    pub external_id: String,
    pub advertiser_id: i64,
    pub format: AdFormat,
    pub body: Option<String>,
    pub headline: Option<String>,
    pub cta: Option<String>,
    pub destination_url: Option<String>,
    /// Primary preview URL for the card; see the transformer's format table.
    pub media_url: Option<String>,
    pub media: Option<AdMedia>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Impressions range, normalized (whitespace stripped, dashes folded to
    /// `-`, lowercased), e.g. `"1k-5k"`.
    pub impressions: Option<String>,
    /// Midpoint of `impressions`; `0` when unparseable.
    pub impressions_estimate: i64,
    /// Country name → estimated impressions.
    pub country_impressions: BTreeMap<String, i64>,
    pub ad_library_url: Option<String>,
    pub advertiser_name: Option<String>,
    pub advertiser_url: Option<String>,
    pub advertiser_logo_url: Option<String>,
    /// Raw targeting block, passed through untyped.
    pub targeting: Option<serde_json::Value>,
}
