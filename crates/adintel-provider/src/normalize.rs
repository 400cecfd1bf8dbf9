//! Normalization from raw dataset items to [`TransformedAd`].
//!
//! Item shapes drift between actor versions, so every field is read through
//! a short list of aliases, either from a nested object (`"advertiser": {…}`)
//! or from flat prefixed keys (`"advertiserName"`). Missing or mistyped values
//! degrade to `None`. The only record that is dropped is one with no usable
//! ad id.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use adintel_core::{
    AdFormat, AdMedia, ArticleMedia, CarouselMedia, CarouselSlide, DocumentMedia, EventMedia,
    FollowCompanyMedia, ImageMedia, JobMedia, MessageMedia, SpotlightMedia, TextMedia,
    TransformedAd, VideoMedia,
};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::impressions::{
    country_share, normalize_impressions, parse_impressions, parse_percentage,
};

static DETAIL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/detail/(\d+)").expect("valid regex"));
static COMPANY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/company/(\d+)").expect("valid regex"));

const AD_LIBRARY_DETAIL_URL: &str = "https://www.linkedin.com/ad-library/detail";

/// Maps one raw dataset item to a [`TransformedAd`] owned by `advertiser_id`.
///
/// Returns `None` when the item has no ad id, neither as a field nor inside
/// its ad library URL. Never panics on malformed input.
#[must_use]
pub fn transform_ad(raw: &Value, advertiser_id: i64) -> Option<TransformedAd> {
    let external_id = extract_ad_id(raw)?;

    let format = first_str(raw, &["format", "adFormat", "type"])
        .map_or_else(|| AdFormat::Other("unknown".to_owned()), |f| AdFormat::parse(&f));

    let advertiser = object(raw, "advertiser");
    let advertiser_name = either(advertiser, &["name"], raw, &["advertiserName"]);
    let advertiser_url = either(
        advertiser,
        &["url", "linkedinUrl"],
        raw,
        &["advertiserUrl", "advertiserLinkedinUrl"],
    );
    let advertiser_logo_url = either(
        advertiser,
        &["logo", "logoUrl"],
        raw,
        &["advertiserLogo", "advertiserLogoUrl"],
    );

    let (media_url, media) = extract_media(
        raw,
        &format,
        advertiser_name.as_deref(),
        advertiser_logo_url.as_deref(),
    );

    let impressions = first_text(raw, &["impressions", "impressionsRange"])
        .map(|text| normalize_impressions(&text))
        .filter(|text| !text.is_empty());
    let impressions_estimate = impressions.as_deref().map_or(0, parse_impressions);
    let country_impressions = country_breakdown(raw, impressions_estimate);

    let availability = object(raw, "availability");
    let start_date = either(availability, &["start", "startDate", "from"], raw, &["startDate"])
        .as_deref()
        .and_then(parse_date);
    let end_date = either(availability, &["end", "endDate", "to"], raw, &["endDate"])
        .as_deref()
        .and_then(parse_date);

    let ad_library_url = first_str(raw, &["adLibraryUrl", "url"])
        .unwrap_or_else(|| format!("{AD_LIBRARY_DETAIL_URL}/{external_id}"));

    Some(TransformedAd {
        external_id,
        advertiser_id,
        format,
        body: first_str(raw, &["body", "commentary", "description", "text"]),
        headline: first_str(raw, &["headline", "title"]),
        cta: first_str(raw, &["cta", "callToAction", "ctaText"]),
        destination_url: first_str(
            raw,
            &["clickUrl", "destinationUrl", "link", "landingPageUrl"],
        ),
        media_url,
        media,
        start_date,
        end_date,
        impressions,
        impressions_estimate,
        country_impressions,
        ad_library_url: Some(ad_library_url),
        advertiser_name,
        advertiser_url,
        advertiser_logo_url,
        targeting: raw.get("targeting").filter(|v| !v.is_null()).cloned(),
    })
}

/// Numeric company id from a LinkedIn company URL
/// (`https://www.linkedin.com/company/1035/`).
#[must_use]
pub fn company_id_from_url(url: &str) -> Option<String> {
    COMPANY_ID_RE
        .captures(url)
        .and_then(|cap| cap.get(1).map(|m| m.as_str().to_owned()))
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

fn extract_ad_id(raw: &Value) -> Option<String> {
    for key in ["adId", "id"] {
        match raw.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_owned()),
            Some(Value::Number(n)) => {
                if let Some(id) = n.as_u64() {
                    return Some(id.to_string());
                }
            }
            _ => {}
        }
    }

    first_str(raw, &["adLibraryUrl", "url"]).and_then(|url| {
        DETAIL_ID_RE
            .captures(&url)
            .and_then(|cap| cap.get(1).map(|m| m.as_str().to_owned()))
    })
}

// ---------------------------------------------------------------------------
// Format-specific media
// ---------------------------------------------------------------------------

/// Primary preview URL and structured payload for the ad's format.
///
/// | format          | preview URL                         |
/// |-----------------|-------------------------------------|
/// | single_image    | image                               |
/// | video           | video                               |
/// | carousel        | first slide with an image           |
/// | document        | cover image, else the document      |
/// | event           | event image                         |
/// | message         | sender image (may be absent)        |
/// | spotlight       | image                               |
/// | text            | optional side image                 |
/// | job             | company logo, else advertiser logo  |
/// | article         | cover image                         |
/// | follow_company  | company logo, else advertiser logo  |
/// | anything else   | none, and no payload                |
fn extract_media(
    raw: &Value,
    format: &AdFormat,
    advertiser_name: Option<&str>,
    advertiser_logo: Option<&str>,
) -> (Option<String>, Option<AdMedia>) {
    let nested_media = object(raw, "media");

    match format {
        AdFormat::SingleImage => {
            let image = object(raw, "image").or(nested_media);
            let media = ImageMedia {
                image_url: either(
                    image,
                    &["url", "imageUrl"],
                    raw,
                    &["imageUrl", "image", "mediaUrl"],
                ),
                alt_text: either(image, &["alt", "altText"], raw, &["imageAlt", "altText"]),
            };
            (media.image_url.clone(), Some(AdMedia::SingleImage(media)))
        }
        AdFormat::Video => {
            let video = object(raw, "video").or(nested_media);
            let media = VideoMedia {
                video_url: either(video, &["url", "videoUrl"], raw, &["videoUrl", "video"]),
                thumbnail_url: either(
                    video,
                    &["thumbnailUrl", "posterUrl", "thumbnail"],
                    raw,
                    &["thumbnailUrl", "thumbnail", "posterUrl"],
                ),
                duration_secs: video
                    .and_then(|v| first_u32(v, &["durationSeconds", "duration"]))
                    .or_else(|| first_u32(raw, &["durationSeconds", "videoDuration"])),
            };
            (media.video_url.clone(), Some(AdMedia::Video(media)))
        }
        AdFormat::Carousel => {
            let slides: Vec<CarouselSlide> = first_array(
                raw,
                &["carouselItems", "slides", "cards", "carousel"],
            )
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| CarouselSlide {
                        image_url: first_str(item, &["imageUrl", "image", "url"]),
                        title: first_str(item, &["title", "headline"]),
                        link_url: first_str(item, &["linkUrl", "clickUrl", "link"]),
                    })
                    .collect()
            })
            .unwrap_or_default();
            let preview = slides.iter().find_map(|s| s.image_url.clone());
            (preview, Some(AdMedia::Carousel(CarouselMedia { slides })))
        }
        AdFormat::Document => {
            let document = object(raw, "document").or(nested_media);
            let media = DocumentMedia {
                document_url: either(document, &["url", "documentUrl"], raw, &["documentUrl"]),
                title: either(document, &["title"], raw, &["documentTitle"]),
                cover_image_url: either(
                    document,
                    &["coverImageUrl", "coverUrl", "imageUrl"],
                    raw,
                    &["documentCoverUrl", "coverImageUrl"],
                ),
                page_count: document
                    .and_then(|d| first_u32(d, &["pageCount", "pages"]))
                    .or_else(|| first_u32(raw, &["pageCount"])),
            };
            let preview = media
                .cover_image_url
                .clone()
                .or_else(|| media.document_url.clone());
            (preview, Some(AdMedia::Document(media)))
        }
        AdFormat::Event => {
            let event = object(raw, "event");
            let media = EventMedia {
                name: either(event, &["name", "title"], raw, &["eventName"]),
                starts_at: either(
                    event,
                    &["startsAt", "startTime", "date"],
                    raw,
                    &["eventStartsAt", "eventDate"],
                ),
                location: either(event, &["location"], raw, &["eventLocation"]),
                image_url: either(event, &["imageUrl", "image"], raw, &["eventImageUrl"]),
                event_url: either(event, &["url", "eventUrl"], raw, &["eventUrl"]),
            };
            (media.image_url.clone(), Some(AdMedia::Event(media)))
        }
        AdFormat::Message => {
            let sender = object(raw, "sender");
            let media = MessageMedia {
                sender_name: either(sender, &["name"], raw, &["senderName"]),
                sender_image_url: either(
                    sender,
                    &["imageUrl", "image", "avatarUrl"],
                    raw,
                    &["senderImageUrl", "senderImage"],
                ),
                subject: first_str(raw, &["subject", "messageSubject"]),
                buttons: first_array(raw, &["buttons", "ctaButtons"])
                    .map(|items| items.iter().filter_map(button_label).collect())
                    .unwrap_or_default(),
            };
            (media.sender_image_url.clone(), Some(AdMedia::Message(media)))
        }
        AdFormat::Spotlight => {
            let media = SpotlightMedia {
                image_url: either(
                    nested_media,
                    &["imageUrl", "url"],
                    raw,
                    &["imageUrl", "image", "spotlightImageUrl"],
                ),
                description: first_str(raw, &["spotlightDescription", "description"]),
            };
            (media.image_url.clone(), Some(AdMedia::Spotlight(media)))
        }
        AdFormat::Text => {
            let media = TextMedia {
                image_url: either(nested_media, &["imageUrl", "url"], raw, &["imageUrl", "image"]),
            };
            (media.image_url.clone(), Some(AdMedia::Text(media)))
        }
        AdFormat::Job => {
            let job = object(raw, "job");
            let media = JobMedia {
                job_title: either(job, &["title", "jobTitle"], raw, &["jobTitle"]),
                location: either(job, &["location"], raw, &["jobLocation"]),
                company_logo_url: either(
                    job,
                    &["companyLogoUrl", "logoUrl"],
                    raw,
                    &["companyLogoUrl"],
                )
                .or_else(|| advertiser_logo.map(str::to_owned)),
            };
            (media.company_logo_url.clone(), Some(AdMedia::Job(media)))
        }
        AdFormat::Article => {
            let article = object(raw, "article");
            let media = ArticleMedia {
                title: either(article, &["title"], raw, &["articleTitle"]),
                article_url: either(article, &["url", "articleUrl"], raw, &["articleUrl"]),
                cover_image_url: either(
                    article,
                    &["coverImageUrl", "imageUrl", "image"],
                    raw,
                    &["articleCoverUrl", "coverImageUrl", "imageUrl"],
                ),
            };
            (media.cover_image_url.clone(), Some(AdMedia::Article(media)))
        }
        AdFormat::FollowCompany => {
            let media = FollowCompanyMedia {
                company_name: first_str(raw, &["companyName"])
                    .or_else(|| advertiser_name.map(str::to_owned)),
                logo_url: first_str(raw, &["companyLogoUrl", "logoUrl"])
                    .or_else(|| advertiser_logo.map(str::to_owned)),
                follower_count: first_i64(raw, &["followerCount", "followers"]),
            };
            (media.logo_url.clone(), Some(AdMedia::FollowCompany(media)))
        }
        AdFormat::Other(_) => (None, None),
    }
}

fn button_label(item: &Value) -> Option<String> {
    match item {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Object(_) => first_str(item, &["text", "label", "title"]),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Impressions and dates
// ---------------------------------------------------------------------------

fn country_breakdown(raw: &Value, total: i64) -> BTreeMap<String, i64> {
    let mut countries = BTreeMap::new();
    let Some(rows) = first_array(
        raw,
        &["impressionsPerCountry", "impressionsByCountry", "countryImpressions"],
    ) else {
        return countries;
    };

    for row in rows {
        let Some(country) = first_str(row, &["country", "name", "countryName"]) else {
            continue;
        };
        let Some(percentage) = ["percentage", "impressions", "share"]
            .iter()
            .find_map(|key| row.get(*key).and_then(parse_percentage))
        else {
            continue;
        };
        *countries.entry(country).or_insert(0) += country_share(total, percentage);
    }

    countries
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

fn object<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get(key).filter(|v| v.is_object())
}

/// First non-blank string among `keys`, trimmed.
fn first_str(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    })
}

/// Like [`first_str`] but also accepts numbers.
fn first_text(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Nested object fields first, then flat fields on the record.
fn either(
    nested: Option<&Value>,
    nested_keys: &[&str],
    raw: &Value,
    flat_keys: &[&str],
) -> Option<String> {
    nested
        .and_then(|n| first_str(n, nested_keys))
        .or_else(|| first_str(raw, flat_keys))
}

fn first_array<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    keys.iter().find_map(|key| obj.get(*key).and_then(Value::as_array))
}

fn first_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| match obj.get(*key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    })
}

fn first_u32(obj: &Value, keys: &[&str]) -> Option<u32> {
    first_i64(obj, keys).and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
