//! Live tests for the sync flows.
//!
//! Each test gets a fresh migrated Postgres database from `#[sqlx::test]`;
//! provider calls go to a wiremock server.

use adintel_core::{FollowStatus, JobType, RunStatus, ScrapeFrequency};
use adintel_db::{
    create_advertiser, create_plan, create_scrape_run, create_user, finish_scrape_run,
    get_ad_by_external_id, get_advertiser, get_scrape_run, get_user_advertiser,
    insert_user_advertiser, list_scrape_runs, set_advertiser_schedule, NewAdvertiser, NewPlan,
    NewScrapeRun, ScrapeRunFilter, ScrapeRunOutcome,
};
use adintel_provider::ProviderClient;
use adintel_sync::{
    add_advertiser, can_add, can_follow, check_budget, follow, poll_until_terminal,
    recalculate_schedule, refollow, remove, start_due_advertisers, start_scrape_run, store_ads,
    sync_all_running, sync_scrape_run, unfollow, FollowError, SyncError, SyncSettings,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ACTOR: &str = "acme~ad-library";

fn settings() -> SyncSettings {
    SyncSettings {
        cost_per_item_usd: Decimal::new(4, 3),
        monthly_budget_usd: Decimal::from(100),
        sync_window_hours: 24,
        default_results_limit: Some(100),
    }
}

fn provider(server: &MockServer) -> ProviderClient {
    ProviderClient::with_base_url("test-token", 5, &server.uri(), ACTOR, 0, 0)
        .expect("client construction should not fail")
}

async fn advertiser_with_company(pool: &sqlx::PgPool, name: &str, company_id: &str) -> i64 {
    create_advertiser(
        pool,
        &NewAdvertiser {
            name,
            company_id: Some(company_id),
            ..NewAdvertiser::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("create_advertiser failed for '{name}': {e}"))
    .id
}

async fn bare_advertiser(pool: &sqlx::PgPool, name: &str) -> i64 {
    create_advertiser(
        pool,
        &NewAdvertiser {
            name,
            ..NewAdvertiser::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("create_advertiser failed for '{name}': {e}"))
    .id
}

async fn insert_run(
    pool: &sqlx::PgPool,
    advertiser_id: i64,
    job_type: JobType,
    external_run_id: &str,
) -> i64 {
    create_scrape_run(
        pool,
        &NewScrapeRun {
            advertiser_id,
            job_type,
            external_run_id,
            external_dataset_id: None,
        },
    )
    .await
    .expect("create_scrape_run failed")
    .id
}

fn raw_ad(id: &str, headline: &str, end_date: &str) -> Value {
    json!({
        "adId": id,
        "format": "SINGLE_IMAGE",
        "headline": headline,
        "body": "Ship faster with Acme",
        "imageUrl": "https://media.example/a.jpg",
        "impressions": "1k\u{2009}\u{2013}\u{2009}5k",
        "availability": {"start": "2026-01-05", "end": end_date},
        "advertiser": {
            "name": "Acme",
            "url": "https://www.linkedin.com/company/1035/",
            "logo": "https://media.example/acme-logo.png"
        }
    })
}

fn three_ads() -> Vec<Value> {
    vec![
        raw_ad("9001", "One", "2026-01-31"),
        raw_ad("9002", "Two", "2026-01-31"),
        raw_ad("9003", "Three", "2026-01-31"),
    ]
}

async fn mount_status(server: &MockServer, run_id: &str, status: &str, dataset_id: Option<&str>) {
    Mock::given(method("GET"))
        .and(path(format!("/actor-runs/{run_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": run_id, "status": status, "defaultDatasetId": dataset_id}
        })))
        .mount(server)
        .await;
}

async fn mount_items(server: &MockServer, dataset_id: &str, items: &[Value]) {
    Mock::given(method("GET"))
        .and(path(format!("/datasets/{dataset_id}/items")))
        .respond_with(ResponseTemplate::new(200).set_body_json(items))
        .mount(server)
        .await;
}

async fn mount_start(server: &MockServer, run_id: &str, dataset_id: Option<&str>) {
    Mock::given(method("POST"))
        .and(path(format!("/acts/{ACTOR}/runs")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {"id": run_id, "status": "READY", "defaultDatasetId": dataset_id}
        })))
        .mount(server)
        .await;
}

async fn dataset_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with("/datasets/"))
        .count()
}

async fn plan(pool: &sqlx::PgPool, name: &str, frequency: ScrapeFrequency) -> i64 {
    create_plan(
        pool,
        &NewPlan {
            name,
            default_frequency: frequency,
            max_followed: None,
            max_tracked: None,
        },
    )
    .await
    .expect("create_plan")
    .id
}

async fn user_on(pool: &sqlx::PgPool, email: &str, plan_id: i64) -> i64 {
    create_user(pool, email, Some(plan_id), None)
        .await
        .expect("create_user")
        .id
}

// ---------------------------------------------------------------------------
// Storage engine
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn initial_store_is_idempotent(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    let batch = vec![
        raw_ad("9001", "One", "2026-01-31"),
        json!({"format": "SINGLE_IMAGE", "headline": "no id"}),
        raw_ad("9002", "Two", "2026-01-31"),
    ];

    let first = store_ads(&pool, &batch, advertiser_id, JobType::Initial)
        .await
        .expect("first store");
    assert_eq!(first.ads_new, 2);
    assert_eq!(first.ads_updated, 0);
    assert_eq!(first.total_processed, 2);

    let before = get_ad_by_external_id(&pool, "9001").await.expect("ad 9001");

    let second = store_ads(&pool, &batch, advertiser_id, JobType::Initial)
        .await
        .expect("second store");
    assert_eq!(second.ads_new, 0);
    assert_eq!(second.ads_updated, 2);
    assert_eq!(second.total_processed, 2);

    let after = get_ad_by_external_id(&pool, "9001").await.expect("ad 9001");
    assert_eq!(after.id, before.id);
    assert_eq!(after.headline, before.headline);
    assert_eq!(after.body, before.body);
    assert_eq!(after.media, before.media);
    assert_eq!(after.impressions, before.impressions);
    assert_eq!(after.impressions_estimate, 3_000);
    assert_eq!(after.first_seen_at, before.first_seen_at);
    assert!(after.last_seen_at >= before.last_seen_at);
}

#[sqlx::test(migrations = "../../migrations")]
async fn store_refreshes_advertiser_aggregates(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    let batch = vec![
        json!({"headline": "unidentifiable"}),
        raw_ad("9001", "One", "2026-01-31"),
    ];

    store_ads(&pool, &batch, advertiser_id, JobType::Initial)
        .await
        .expect("store");

    let advertiser = get_advertiser(&pool, advertiser_id)
        .await
        .expect("advertiser");
    assert_eq!(advertiser.total_ads_found, 2, "snapshot counts raw items");
    assert_eq!(
        advertiser.logo_url.as_deref(),
        Some("https://media.example/acme-logo.png")
    );
    assert_eq!(advertiser.company_id.as_deref(), Some("1035"));
    assert!(advertiser.last_scraped_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn scheduled_store_keeps_creative_and_refreshes_liveness(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;

    store_ads(
        &pool,
        &[raw_ad("9001", "Original headline", "2026-01-31")],
        advertiser_id,
        JobType::Initial,
    )
    .await
    .expect("initial store");
    let before = get_ad_by_external_id(&pool, "9001").await.expect("ad");

    let result = store_ads(
        &pool,
        &[
            raw_ad("9001", "Rewritten headline", "2026-02-28"),
            raw_ad("9002", "Brand new", "2026-02-28"),
        ],
        advertiser_id,
        JobType::Scheduled,
    )
    .await
    .expect("scheduled store");
    assert_eq!(result.ads_updated, 1);
    assert_eq!(result.ads_new, 1);

    let after = get_ad_by_external_id(&pool, "9001").await.expect("ad");
    assert_eq!(after.headline.as_deref(), Some("Original headline"));
    assert_eq!(after.end_date, NaiveDate::from_ymd_opt(2026, 2, 28));
    assert!(after.last_seen_at >= before.last_seen_at);

    let fresh = get_ad_by_external_id(&pool, "9002").await.expect("new ad");
    assert_eq!(fresh.headline.as_deref(), Some("Brand new"));
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn schedule_follows_most_demanding_follower(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    let manual = plan(&pool, "free", ScrapeFrequency::Manual).await;
    let monthly = plan(&pool, "starter", ScrapeFrequency::Monthly).await;
    let weekly = plan(&pool, "pro", ScrapeFrequency::Weekly).await;

    for (email, plan_id) in [("m@example.com", manual), ("mo@example.com", monthly)] {
        let user_id = user_on(&pool, email, plan_id).await;
        insert_user_advertiser(&pool, user_id, advertiser_id, FollowStatus::Following, None)
            .await
            .expect("insert link");
    }

    let before = Utc::now();
    let frequency = recalculate_schedule(&pool, advertiser_id)
        .await
        .expect("recalculate");
    assert_eq!(frequency, Some(ScrapeFrequency::Monthly));
    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert_eq!(advertiser.scrape_frequency.as_deref(), Some("monthly"));
    let next = advertiser.next_scrape_at.expect("next_scrape_at set");
    assert!(next >= before + Duration::days(30));
    assert!(next <= Utc::now() + Duration::days(30));

    let pro = user_on(&pool, "w@example.com", weekly).await;
    insert_user_advertiser(&pool, pro, advertiser_id, FollowStatus::Following, None)
        .await
        .expect("insert link");
    let frequency = recalculate_schedule(&pool, advertiser_id)
        .await
        .expect("recalculate");
    assert_eq!(frequency, Some(ScrapeFrequency::Weekly));
}

#[sqlx::test(migrations = "../../migrations")]
async fn schedule_clears_without_followers(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    set_advertiser_schedule(
        &pool,
        advertiser_id,
        Some(ScrapeFrequency::Weekly),
        Some(Utc::now() + Duration::days(7)),
    )
    .await
    .expect("seed schedule");

    let frequency = recalculate_schedule(&pool, advertiser_id)
        .await
        .expect("recalculate");
    assert_eq!(frequency, None);

    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert!(advertiser.scrape_frequency.is_none());
    assert!(advertiser.next_scrape_at.is_none());
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn budget_blocks_once_completed_spend_reaches_limit(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    for (run, cost) in [("R1", 10), ("R2", 15)] {
        let id = insert_run(&pool, advertiser_id, JobType::Initial, run).await;
        finish_scrape_run(
            &pool,
            id,
            &ScrapeRunOutcome {
                status: RunStatus::Completed,
                ads_new: 1,
                ads_updated: 0,
                cost_usd: Decimal::from(cost),
                error_message: None,
            },
        )
        .await
        .expect("finish");
    }
    let failed = insert_run(&pool, advertiser_id, JobType::Initial, "R3").await;
    finish_scrape_run(
        &pool,
        failed,
        &ScrapeRunOutcome {
            status: RunStatus::Failed,
            ads_new: 0,
            ads_updated: 0,
            cost_usd: Decimal::from(50),
            error_message: Some("provider run ended with status FAILED"),
        },
    )
    .await
    .expect("finish failed");

    let status = check_budget(&pool, Decimal::from(20)).await.expect("budget");
    assert!(!status.ok);
    assert_eq!(status.current_spend, Decimal::from(25));
    assert_eq!(status.limit, Decimal::from(20));
}

#[sqlx::test(migrations = "../../migrations")]
async fn start_is_refused_over_budget(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/acts/{ACTOR}/runs")))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let spent = insert_run(&pool, advertiser_id, JobType::Initial, "R0").await;
    finish_scrape_run(
        &pool,
        spent,
        &ScrapeRunOutcome {
            status: RunStatus::Completed,
            ads_new: 0,
            ads_updated: 0,
            cost_usd: Decimal::from(100),
            error_message: None,
        },
    )
    .await
    .expect("finish");

    let err = start_scrape_run(
        &pool,
        &provider(&server),
        &settings(),
        advertiser_id,
        JobType::Initial,
    )
    .await
    .expect_err("over budget");
    assert!(matches!(err, SyncError::BudgetExceeded { .. }));

    let runs = list_scrape_runs(
        &pool,
        &ScrapeRunFilter {
            advertiser_id: Some(advertiser_id),
            status: None,
            limit: 10,
        },
    )
    .await
    .expect("list");
    assert_eq!(runs.len(), 1, "no new run row");
}

// ---------------------------------------------------------------------------
// Start flow
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn failed_start_writes_no_run(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/acts/{ACTOR}/runs")))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let err = start_scrape_run(
        &pool,
        &provider(&server),
        &settings(),
        advertiser_id,
        JobType::Initial,
    )
    .await
    .expect_err("provider failure");
    assert!(matches!(err, SyncError::Provider(_)));

    let runs = list_scrape_runs(
        &pool,
        &ScrapeRunFilter {
            advertiser_id: Some(advertiser_id),
            status: None,
            limit: 10,
        },
    )
    .await
    .expect("list");
    assert!(runs.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn start_without_target_is_rejected(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let advertiser_id = bare_advertiser(&pool, "Nameless").await;

    let err = start_scrape_run(
        &pool,
        &provider(&server),
        &settings(),
        advertiser_id,
        JobType::Initial,
    )
    .await
    .expect_err("no target");
    assert!(matches!(
        err,
        SyncError::Provider(adintel_provider::ProviderError::MissingTarget)
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn start_due_starts_scheduled_runs(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    mount_start(&server, "R-due", Some("D-due")).await;

    let due = advertiser_with_company(&pool, "Due", "1").await;
    let later = advertiser_with_company(&pool, "Later", "2").await;
    set_advertiser_schedule(
        &pool,
        due,
        Some(ScrapeFrequency::Weekly),
        Some(Utc::now() - Duration::hours(1)),
    )
    .await
    .expect("schedule due");
    set_advertiser_schedule(
        &pool,
        later,
        Some(ScrapeFrequency::Weekly),
        Some(Utc::now() + Duration::days(3)),
    )
    .await
    .expect("schedule later");

    let summary = start_due_advertisers(&pool, &provider(&server), &settings())
        .await
        .expect("start due");
    assert_eq!(summary.started, 1);
    assert_eq!(summary.skipped_budget, 0);
    assert_eq!(summary.failed, 0);

    let runs = list_scrape_runs(
        &pool,
        &ScrapeRunFilter {
            advertiser_id: Some(due),
            status: Some(RunStatus::Running),
            limit: 10,
        },
    )
    .await
    .expect("list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].job_type, "scheduled");
    assert_eq!(runs[0].external_dataset_id.as_deref(), Some("D-due"));

    let again = start_due_advertisers(&pool, &provider(&server), &settings())
        .await
        .expect("second sweep");
    assert_eq!(again.started, 0, "in-flight advertiser is not started twice");
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn run_lifecycle_end_to_end(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let settings = settings();
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;

    mount_start(&server, "R1", None).await;
    let run = start_scrape_run(&pool, &client, &settings, advertiser_id, JobType::Initial)
        .await
        .expect("start");
    assert_eq!(run.external_run_id.as_deref(), Some("R1"));
    assert!(run.external_dataset_id.is_none());

    // No dataset allocated yet.
    mount_status(&server, "R1", "RUNNING", None).await;
    let first = sync_scrape_run(&pool, &client, &settings, run.id)
        .await
        .expect("first sync")
        .expect("outcome");
    assert_eq!(first.status, RunStatus::Running);
    assert_eq!(first.ads_found, 0);
    assert_eq!(dataset_requests(&server).await, 0);

    // Dataset allocated and filling.
    server.reset().await;
    mount_status(&server, "R1", "RUNNING", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()).await;
    let second = sync_scrape_run(&pool, &client, &settings, run.id)
        .await
        .expect("second sync")
        .expect("outcome");
    assert_eq!(second.status, RunStatus::Running);
    assert_eq!(second.ads_found, 3);
    assert!(second.completed_at.is_none());
    for id in ["9001", "9002", "9003"] {
        get_ad_by_external_id(&pool, id)
            .await
            .unwrap_or_else(|e| panic!("ad {id} should exist: {e}"));
    }

    // Provider finished.
    server.reset().await;
    mount_status(&server, "R1", "SUCCEEDED", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()).await;
    let third = sync_scrape_run(&pool, &client, &settings, run.id)
        .await
        .expect("third sync")
        .expect("outcome");
    assert_eq!(third.status, RunStatus::Completed);
    assert_eq!(third.ads_found, 3);
    assert_eq!(third.ads_new, Some(0));
    assert_eq!(third.ads_updated, Some(3));
    assert_eq!(third.cost_usd, Some(Decimal::new(12, 3)));
    assert!(third.completed_at.is_some());
    assert!(third.error_message.is_none());

    let stored = get_scrape_run(&pool, run.id).await.expect("run");
    assert_eq!(stored.status, "completed");
    assert_eq!(stored.external_dataset_id.as_deref(), Some("D1"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn resyncing_a_terminal_run_is_stable(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let run_id = insert_run(&pool, advertiser_id, JobType::Initial, "R1").await;

    mount_status(&server, "R1", "SUCCEEDED", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()).await;

    let first = sync_scrape_run(&pool, &client, &settings(), run_id)
        .await
        .expect("sync")
        .expect("outcome");
    let again = sync_scrape_run(&pool, &client, &settings(), run_id)
        .await
        .expect("resync")
        .expect("outcome");

    assert_eq!(first.ads_new, Some(3));
    assert_eq!(first.ads_updated, Some(0));
    assert_eq!(again.status, RunStatus::Completed);
    assert_eq!(again.ads_found, first.ads_found);
    assert_eq!(again.completed_at, first.completed_at);
    assert_eq!(again.cost_usd, first.cost_usd);

    // Every ad already exists on the second pass, so the split moves to updated.
    assert_eq!(again.ads_new, Some(0));
    assert_eq!(again.ads_updated, Some(3));
    let stored = get_scrape_run(&pool, run_id).await.expect("run");
    assert_eq!(stored.ads_new, Some(0));
    assert_eq!(stored.ads_updated, Some(3));
    assert_eq!(stored.completed_at, first.completed_at);
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_provider_run_is_recorded_not_raised(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let run_id = insert_run(&pool, advertiser_id, JobType::Initial, "R1").await;

    mount_status(&server, "R1", "TIMED-OUT", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()[..2]).await;

    let outcome = sync_scrape_run(&pool, &client, &settings(), run_id)
        .await
        .expect("sync")
        .expect("outcome");
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.ads_found, 2);
    assert_eq!(outcome.ads_new, Some(2));
    assert_eq!(outcome.cost_usd, Some(Decimal::new(8, 3)));
    assert!(outcome
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("TIMED-OUT")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn run_ending_without_dataset_is_finished_empty(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let run_id = insert_run(&pool, advertiser_id, JobType::Initial, "R1").await;

    mount_status(&server, "R1", "ABORTED", None).await;

    let outcome = sync_scrape_run(&pool, &client, &settings(), run_id)
        .await
        .expect("sync")
        .expect("outcome");
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.ads_found, 0);
    assert_eq!(outcome.cost_usd, Some(Decimal::ZERO));
    assert_eq!(dataset_requests(&server).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn successful_scheduled_run_advances_schedule(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    set_advertiser_schedule(
        &pool,
        advertiser_id,
        Some(ScrapeFrequency::Weekly),
        Some(Utc::now() - Duration::hours(1)),
    )
    .await
    .expect("schedule");
    let run_id = insert_run(&pool, advertiser_id, JobType::Scheduled, "R1").await;

    mount_status(&server, "R1", "SUCCEEDED", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()).await;

    let outcome = sync_scrape_run(&pool, &client, &settings(), run_id)
        .await
        .expect("sync")
        .expect("outcome");
    let completed_at = outcome.completed_at.expect("completed_at");

    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert_eq!(advertiser.scrape_frequency.as_deref(), Some("weekly"));
    assert_eq!(
        advertiser.next_scrape_at,
        Some(completed_at + Duration::days(7))
    );
    assert_eq!(advertiser.last_scraped_at, Some(completed_at));
}

#[sqlx::test(migrations = "../../migrations")]
async fn initial_run_leaves_schedule_alone(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let next = Utc::now() + Duration::days(3);
    set_advertiser_schedule(&pool, advertiser_id, Some(ScrapeFrequency::Monthly), Some(next))
        .await
        .expect("schedule");
    let run_id = insert_run(&pool, advertiser_id, JobType::Initial, "R1").await;

    mount_status(&server, "R1", "SUCCEEDED", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()).await;
    sync_scrape_run(&pool, &client, &settings(), run_id)
        .await
        .expect("sync");

    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    let stored = advertiser.next_scrape_at.expect("still scheduled");
    assert!((stored - next).num_milliseconds().abs() < 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn batch_sync_isolates_failing_runs(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let broken = insert_run(&pool, advertiser_id, JobType::Initial, "R-broken").await;
    let _healthy = insert_run(&pool, advertiser_id, JobType::Initial, "R-ok").await;

    Mock::given(method("GET"))
        .and(path("/actor-runs/R-broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_status(&server, "R-ok", "SUCCEEDED", Some("D-ok")).await;
    mount_items(&server, "D-ok", &[]).await;

    let summary = sync_all_running(&pool, &client, &settings())
        .await
        .expect("batch sync");
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.still_running, 0);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].scrape_run_id, broken);

    let run = get_scrape_run(&pool, broken).await.expect("run");
    assert_eq!(run.status, "running", "provider errors do not fail the run");
}

#[sqlx::test(migrations = "../../migrations")]
async fn poll_stops_at_terminal_or_after_max_attempts(pool: sqlx::PgPool) {
    let server = MockServer::start().await;
    let client = provider(&server);
    let advertiser_id = advertiser_with_company(&pool, "Acme", "1035").await;
    let done = insert_run(&pool, advertiser_id, JobType::Initial, "R-done").await;
    let slow = insert_run(&pool, advertiser_id, JobType::Initial, "R-slow").await;

    mount_status(&server, "R-done", "SUCCEEDED", Some("D1")).await;
    mount_items(&server, "D1", &three_ads()).await;
    mount_status(&server, "R-slow", "RUNNING", None).await;

    let finished = poll_until_terminal(
        &pool,
        &client,
        &settings(),
        done,
        std::time::Duration::ZERO,
        5,
    )
    .await
    .expect("poll")
    .expect("outcome");
    assert_eq!(finished.status, RunStatus::Completed);

    let pending = poll_until_terminal(
        &pool,
        &client,
        &settings(),
        slow,
        std::time::Duration::ZERO,
        2,
    )
    .await
    .expect("poll")
    .expect("outcome");
    assert_eq!(pending.status, RunStatus::Running);

    let status_calls = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/actor-runs/R-slow")
        .count();
    assert_eq!(status_calls, 2);
}

// ---------------------------------------------------------------------------
// Follow state machine
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn follow_lifecycle_drives_shared_schedule(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    let weekly = plan(&pool, "pro", ScrapeFrequency::Weekly).await;
    let user_id = user_on(&pool, "pro@example.com", weekly).await;

    add_advertiser(&pool, user_id, advertiser_id)
        .await
        .expect("add");
    let err = add_advertiser(&pool, user_id, advertiser_id)
        .await
        .expect_err("duplicate add");
    assert_eq!(err.code(), "already_tracked");

    let link = follow(&pool, user_id, advertiser_id).await.expect("follow");
    assert_eq!(link.status, "following");
    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert_eq!(advertiser.scrape_frequency.as_deref(), Some("weekly"));
    assert!(advertiser.next_scrape_at.is_some());
    assert_eq!(link.next_scrape_at, advertiser.next_scrape_at);

    let err = follow(&pool, user_id, advertiser_id)
        .await
        .expect_err("already following");
    assert_eq!(err.code(), "invalid_transition");

    let link = unfollow(&pool, user_id, advertiser_id)
        .await
        .expect("unfollow");
    assert_eq!(link.status, "archived");
    assert!(link.next_scrape_at.is_none());
    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert!(advertiser.scrape_frequency.is_none());
    assert!(advertiser.next_scrape_at.is_none());

    let err = remove(&pool, user_id, advertiser_id)
        .await
        .expect_err("archived links cannot be removed");
    assert_eq!(err.code(), "invalid_transition");

    refollow(&pool, user_id, advertiser_id)
        .await
        .expect("refollow");
    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert_eq!(advertiser.scrape_frequency.as_deref(), Some("weekly"));

    remove(&pool, user_id, advertiser_id).await.expect("remove");
    assert!(get_user_advertiser(&pool, user_id, advertiser_id)
        .await
        .expect("lookup")
        .is_none());
    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert!(advertiser.scrape_frequency.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn follow_rejections_happen_before_writes(pool: sqlx::PgPool) {
    let first = bare_advertiser(&pool, "First").await;
    let second = bare_advertiser(&pool, "Second").await;
    let third = bare_advertiser(&pool, "Third").await;

    let limited = create_plan(
        &pool,
        &NewPlan {
            name: "limited",
            default_frequency: ScrapeFrequency::Monthly,
            max_followed: Some(1),
            max_tracked: Some(2),
        },
    )
    .await
    .expect("plan")
    .id;
    let user_id = user_on(&pool, "limited@example.com", limited).await;

    let err = follow(&pool, user_id, first)
        .await
        .expect_err("not tracked");
    assert!(matches!(err, FollowError::NotTracked { .. }));

    add_advertiser(&pool, user_id, first).await.expect("add 1");
    add_advertiser(&pool, user_id, second).await.expect("add 2");
    let err = add_advertiser(&pool, user_id, third)
        .await
        .expect_err("tracked limit");
    assert_eq!(err.code(), "advertiser_limit_reached");

    follow(&pool, user_id, first).await.expect("follow 1");
    let err = follow(&pool, user_id, second)
        .await
        .expect_err("follow limit");
    assert_eq!(err.code(), "follow_limit_reached");
    let link = get_user_advertiser(&pool, user_id, second)
        .await
        .expect("lookup")
        .expect("link");
    assert_eq!(link.status, "added", "rejected follow leaves the link untouched");

    let follow_check = can_follow(&pool, user_id).await.expect("can_follow");
    assert!(!follow_check.allowed);
    assert_eq!(follow_check.used, 1);
    assert_eq!(follow_check.limit, Some(1));

    let add_check = can_add(&pool, user_id).await.expect("can_add");
    assert!(!add_check.allowed);
    assert_eq!(add_check.used, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_plan_cannot_follow(pool: sqlx::PgPool) {
    let advertiser_id = bare_advertiser(&pool, "Acme").await;
    let free = plan(&pool, "free", ScrapeFrequency::Manual).await;
    let user_id = user_on(&pool, "free@example.com", free).await;

    add_advertiser(&pool, user_id, advertiser_id)
        .await
        .expect("add");
    let err = follow(&pool, user_id, advertiser_id)
        .await
        .expect_err("manual plan");
    assert!(matches!(err, FollowError::ManualPlan));

    let override_user = create_user(
        &pool,
        "upgraded@example.com",
        Some(free),
        Some(ScrapeFrequency::Monthly),
    )
    .await
    .expect("user")
    .id;
    add_advertiser(&pool, override_user, advertiser_id)
        .await
        .expect("add");
    follow(&pool, override_user, advertiser_id)
        .await
        .expect("override lets the user follow");
    let advertiser = get_advertiser(&pool, advertiser_id).await.expect("get");
    assert_eq!(advertiser.scrape_frequency.as_deref(), Some("monthly"));
}
