use super::*;
use serde_json::json;

fn base(format: &str) -> Value {
    json!({
        "adId": "7001",
        "format": format,
        "advertiser": {
            "name": "Acme",
            "url": "https://www.linkedin.com/company/1035/",
            "logo": "https://media.example/acme-logo.png"
        }
    })
}

fn with(mut raw: Value, extra: &Value) -> Value {
    if let (Some(target), Some(source)) = (raw.as_object_mut(), extra.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    raw
}

fn transform(raw: &Value) -> TransformedAd {
    transform_ad(raw, 42).expect("record has an id")
}

// -----------------------------------------------------------------------
// identity
// -----------------------------------------------------------------------

#[test]
fn record_without_any_id_is_skipped() {
    assert!(transform_ad(&json!({"format": "SINGLE_IMAGE"}), 1).is_none());
    assert!(transform_ad(&json!({"adId": "  "}), 1).is_none());
    assert!(transform_ad(&json!({"url": "https://example.com/nothing"}), 1).is_none());
}

#[test]
fn numeric_id_is_stringified() {
    let ad = transform(&json!({"id": 987_654_321_u64}));
    assert_eq!(ad.external_id, "987654321");
}

#[test]
fn id_falls_back_to_ad_library_url() {
    let ad = transform(&json!({
        "adLibraryUrl": "https://www.linkedin.com/ad-library/detail/555123?trk=x"
    }));
    assert_eq!(ad.external_id, "555123");
    assert_eq!(
        ad.ad_library_url.as_deref(),
        Some("https://www.linkedin.com/ad-library/detail/555123?trk=x")
    );
}

#[test]
fn ad_library_url_is_synthesized_when_missing() {
    let ad = transform(&json!({"adId": "7001"}));
    assert_eq!(
        ad.ad_library_url.as_deref(),
        Some("https://www.linkedin.com/ad-library/detail/7001")
    );
    assert_eq!(ad.advertiser_id, 42);
}

#[test]
fn garbage_input_never_panics() {
    for raw in [
        json!(null),
        json!(42),
        json!("string"),
        json!([1, 2, 3]),
        json!({"adId": {"nested": true}}),
        json!({"adId": "1", "format": 7, "carouselItems": "nope", "impressionsPerCountry": {}}),
    ] {
        let _ = transform_ad(&raw, 1);
    }
}

// -----------------------------------------------------------------------
// shared fields
// -----------------------------------------------------------------------

#[test]
fn nested_advertiser_fields_are_extracted() {
    let ad = transform(&base("SINGLE_IMAGE"));
    assert_eq!(ad.advertiser_name.as_deref(), Some("Acme"));
    assert_eq!(
        ad.advertiser_url.as_deref(),
        Some("https://www.linkedin.com/company/1035/")
    );
    assert_eq!(
        ad.advertiser_logo_url.as_deref(),
        Some("https://media.example/acme-logo.png")
    );
}

#[test]
fn flat_advertiser_fields_are_extracted() {
    let ad = transform(&json!({
        "adId": "1",
        "advertiserName": "Globex",
        "advertiserUrl": "https://www.linkedin.com/company/77",
        "advertiserLogoUrl": "https://media.example/globex.png"
    }));
    assert_eq!(ad.advertiser_name.as_deref(), Some("Globex"));
    assert_eq!(
        ad.advertiser_logo_url.as_deref(),
        Some("https://media.example/globex.png")
    );
}

#[test]
fn text_fields_use_aliases_and_trim() {
    let ad = transform(&json!({
        "adId": "1",
        "commentary": "  Ship faster.  ",
        "title": "Acme Cloud",
        "callToAction": "Learn more",
        "clickUrl": "https://acme.example/cloud"
    }));
    assert_eq!(ad.body.as_deref(), Some("Ship faster."));
    assert_eq!(ad.headline.as_deref(), Some("Acme Cloud"));
    assert_eq!(ad.cta.as_deref(), Some("Learn more"));
    assert_eq!(
        ad.destination_url.as_deref(),
        Some("https://acme.example/cloud")
    );
}

#[test]
fn availability_dates_accept_several_formats() {
    let ad = transform(&json!({
        "adId": "1",
        "availability": {"start": "Jan 5, 2026", "end": "2026-02-01T00:00:00Z"}
    }));
    assert_eq!(ad.start_date, NaiveDate::from_ymd_opt(2026, 1, 5));
    assert_eq!(ad.end_date, NaiveDate::from_ymd_opt(2026, 2, 1));

    let flat = transform(&json!({"adId": "1", "startDate": "2025-12-31", "endDate": "soon"}));
    assert_eq!(flat.start_date, NaiveDate::from_ymd_opt(2025, 12, 31));
    assert_eq!(flat.end_date, None);
}

#[test]
fn targeting_is_passed_through() {
    let ad = transform(&json!({
        "adId": "1",
        "targeting": {"language": "English", "location": ["France"]}
    }));
    assert_eq!(ad.targeting, Some(json!({"language": "English", "location": ["France"]})));

    let none = transform(&json!({"adId": "1", "targeting": null}));
    assert!(none.targeting.is_none());
}

// -----------------------------------------------------------------------
// impressions
// -----------------------------------------------------------------------

#[test]
fn impressions_estimate_and_country_split() {
    let ad = transform(&json!({
        "adId": "1",
        "impressions": "1k\u{2009}\u{2013}\u{2009}5k",
        "impressionsPerCountry": [
            {"country": "France", "impressions": "45%"},
            {"country": "Germany", "percentage": 30},
            {"country": "Spain", "impressions": "< 1%"},
            {"impressions": "25%"}
        ]
    }));

    assert_eq!(ad.impressions.as_deref(), Some("1k-5k"));
    assert_eq!(ad.impressions_estimate, 3_000);
    assert_eq!(ad.country_impressions.get("France"), Some(&1_350));
    assert_eq!(ad.country_impressions.get("Germany"), Some(&900));
    assert!(!ad.country_impressions.contains_key("Spain"));
    assert_eq!(ad.country_impressions.len(), 2);
}

#[test]
fn unparseable_impressions_yield_zero_estimate() {
    let ad = transform(&json!({
        "adId": "1",
        "impressions": "< 1k",
        "impressionsPerCountry": [{"country": "France", "impressions": "100%"}]
    }));
    assert_eq!(ad.impressions.as_deref(), Some("<1k"));
    assert_eq!(ad.impressions_estimate, 0);
    assert_eq!(ad.country_impressions.get("France"), Some(&0));
}

// -----------------------------------------------------------------------
// format matrix
// -----------------------------------------------------------------------

#[test]
fn single_image_uses_image_url() {
    let ad = transform(&with(
        base("SINGLE_IMAGE"),
        &json!({"imageUrl": "https://media.example/a.jpg", "imageAlt": "A"}),
    ));
    assert_eq!(ad.format, AdFormat::SingleImage);
    assert_eq!(ad.media_url.as_deref(), Some("https://media.example/a.jpg"));
    assert_eq!(
        ad.media,
        Some(AdMedia::SingleImage(ImageMedia {
            image_url: Some("https://media.example/a.jpg".to_string()),
            alt_text: Some("A".to_string()),
        }))
    );
}

#[test]
fn video_uses_video_url_and_keeps_thumbnail() {
    let ad = transform(&with(
        base("VIDEO"),
        &json!({"video": {"url": "https://media.example/v.mp4", "thumbnailUrl": "https://media.example/v.jpg", "duration": 30}}),
    ));
    assert_eq!(ad.media_url.as_deref(), Some("https://media.example/v.mp4"));
    match ad.media {
        Some(AdMedia::Video(video)) => {
            assert_eq!(video.thumbnail_url.as_deref(), Some("https://media.example/v.jpg"));
            assert_eq!(video.duration_secs, Some(30));
        }
        other => panic!("unexpected media: {other:?}"),
    }
}

#[test]
fn carousel_uses_first_slide_with_image() {
    let ad = transform(&with(
        base("CAROUSEL"),
        &json!({"carouselItems": [
            {"title": "No image"},
            {"imageUrl": "https://media.example/s2.jpg", "title": "Two", "linkUrl": "https://acme.example/2"},
            {"imageUrl": "https://media.example/s3.jpg"}
        ]}),
    ));
    assert_eq!(ad.media_url.as_deref(), Some("https://media.example/s2.jpg"));
    match ad.media {
        Some(AdMedia::Carousel(carousel)) => assert_eq!(carousel.slides.len(), 3),
        other => panic!("unexpected media: {other:?}"),
    }
}

#[test]
fn document_prefers_cover_then_document_url() {
    let with_cover = transform(&with(
        base("DOCUMENT"),
        &json!({"document": {"url": "https://media.example/d.pdf", "coverImageUrl": "https://media.example/d.jpg", "pageCount": 12}}),
    ));
    assert_eq!(with_cover.media_url.as_deref(), Some("https://media.example/d.jpg"));

    let without_cover = transform(&with(
        base("DOCUMENT"),
        &json!({"documentUrl": "https://media.example/d.pdf"}),
    ));
    assert_eq!(without_cover.media_url.as_deref(), Some("https://media.example/d.pdf"));
}

#[test]
fn event_uses_event_image() {
    let ad = transform(&with(
        base("EVENT"),
        &json!({"event": {"name": "Acme Summit", "imageUrl": "https://media.example/e.jpg", "location": "Paris"}}),
    ));
    assert_eq!(ad.media_url.as_deref(), Some("https://media.example/e.jpg"));
    match ad.media {
        Some(AdMedia::Event(event)) => {
            assert_eq!(event.name.as_deref(), Some("Acme Summit"));
            assert_eq!(event.location.as_deref(), Some("Paris"));
        }
        other => panic!("unexpected media: {other:?}"),
    }
}

#[test]
fn message_uses_sender_image_which_may_be_absent() {
    let ad = transform(&with(
        base("MESSAGE"),
        &json!({"sender": {"name": "Jane"}, "buttons": ["Reply", {"text": "Book demo"}, 3]}),
    ));
    assert_eq!(ad.media_url, None);
    match ad.media {
        Some(AdMedia::Message(message)) => {
            assert_eq!(message.sender_name.as_deref(), Some("Jane"));
            assert_eq!(message.buttons, vec!["Reply", "Book demo"]);
        }
        other => panic!("unexpected media: {other:?}"),
    }
}

#[test]
fn spotlight_and_text_use_image() {
    let spotlight = transform(&with(
        base("SPOTLIGHT"),
        &json!({"imageUrl": "https://media.example/sp.jpg"}),
    ));
    assert_eq!(spotlight.media_url.as_deref(), Some("https://media.example/sp.jpg"));

    let text = transform(&base("TEXT"));
    assert_eq!(text.media_url, None);
    assert!(matches!(text.media, Some(AdMedia::Text(_))));
}

#[test]
fn job_and_follow_company_fall_back_to_advertiser_logo() {
    let job = transform(&with(base("JOB"), &json!({"jobTitle": "Engineer"})));
    assert_eq!(
        job.media_url.as_deref(),
        Some("https://media.example/acme-logo.png")
    );

    let follow = transform(&with(base("FOLLOW_COMPANY"), &json!({"followerCount": "12,345"})));
    assert_eq!(
        follow.media_url.as_deref(),
        Some("https://media.example/acme-logo.png")
    );
    match follow.media {
        Some(AdMedia::FollowCompany(company)) => {
            assert_eq!(company.company_name.as_deref(), Some("Acme"));
            assert_eq!(company.follower_count, Some(12_345));
        }
        other => panic!("unexpected media: {other:?}"),
    }
}

#[test]
fn article_uses_cover_image() {
    let ad = transform(&with(
        base("ARTICLE"),
        &json!({"article": {"title": "Why Acme", "url": "https://acme.example/a", "coverImageUrl": "https://media.example/ar.jpg"}}),
    ));
    assert_eq!(ad.media_url.as_deref(), Some("https://media.example/ar.jpg"));
}

#[test]
fn unknown_format_has_no_media() {
    let ad = transform(&with(base("LIVE_STREAM"), &json!({"imageUrl": "https://x"})));
    assert_eq!(ad.format, AdFormat::Other("live_stream".to_string()));
    assert_eq!(ad.media_url, None);
    assert_eq!(ad.media, None);
}

// -----------------------------------------------------------------------
// company_id_from_url
// -----------------------------------------------------------------------

#[test]
fn company_id_is_read_from_company_url() {
    assert_eq!(
        company_id_from_url("https://www.linkedin.com/company/1035/"),
        Some("1035".to_string())
    );
    assert_eq!(company_id_from_url("https://www.linkedin.com/company/acme"), None);
}
