//! Scrape run command handlers for the CLI.
//!
//! Every handler goes through `adintel-sync`, so a run started or synced here
//! follows the same lifecycle as one driven by the server's scheduler.

use std::time::Duration;

use adintel_core::{AppConfig, JobType, RunStatus};
use adintel_db::{ScrapeRunFilter, ScrapeRunRow};
use adintel_provider::ProviderClient;
use adintel_sync::{RunSyncFailure, StartDueSummary, SyncOutcome, SyncSettings};
use clap::Subcommand;

/// Sub-commands available under `runs`.
#[derive(Debug, Subcommand)]
pub enum RunsCommands {
    /// Start a provider run for one advertiser
    Start {
        /// Internal advertiser id
        advertiser_id: i64,
        /// Record the run as a scheduled re-scrape instead of an initial capture
        #[arg(long)]
        scheduled: bool,
        /// Poll the run until it finishes
        #[arg(long)]
        wait: bool,
        /// Seconds between polls when waiting
        #[arg(long, default_value = "10")]
        interval_secs: u64,
        /// Maximum number of polls when waiting
        #[arg(long, default_value = "60")]
        max_attempts: u32,
    },
    /// Sync one scrape run against the provider
    Sync {
        /// Internal scrape run id
        run_id: i64,
    },
    /// Sync every running scrape run inside the sync window
    SyncAll,
    /// Start scheduled runs for every advertiser that is due
    StartDue,
    /// List recent scrape runs
    List {
        /// Only runs for this advertiser
        #[arg(long)]
        advertiser: Option<i64>,
        /// Only runs in this status (running, completed, failed)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

pub(crate) async fn dispatch(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: RunsCommands,
) -> anyhow::Result<()> {
    let settings = SyncSettings::from_app_config(config);
    match command {
        RunsCommands::Start {
            advertiser_id,
            scheduled,
            wait,
            interval_secs,
            max_attempts,
        } => {
            let job_type = if scheduled {
                JobType::Scheduled
            } else {
                JobType::Initial
            };
            let poll = wait.then(|| (Duration::from_secs(interval_secs), max_attempts));
            run_start(pool, config, &settings, advertiser_id, job_type, poll).await
        }
        RunsCommands::Sync { run_id } => run_sync(pool, config, &settings, run_id).await,
        RunsCommands::SyncAll => run_sync_all(pool, config, &settings).await,
        RunsCommands::StartDue => run_start_due(pool, config, &settings).await,
        RunsCommands::List {
            advertiser,
            status,
            limit,
        } => run_list(pool, advertiser, status.as_deref(), limit).await,
    }
}

fn provider_client(config: &AppConfig) -> anyhow::Result<ProviderClient> {
    ProviderClient::from_app_config(config)
        .map_err(|e| anyhow::anyhow!("failed to build provider client: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("APIFY_TOKEN is not set; cannot reach the scrape provider"))
}

/// Start a run and optionally poll it to completion.
///
/// # Errors
///
/// Returns an error if the provider is not configured, the budget is
/// exhausted, the advertiser has no scrape target, or any sync step fails.
async fn run_start(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    settings: &SyncSettings,
    advertiser_id: i64,
    job_type: JobType,
    poll: Option<(Duration, u32)>,
) -> anyhow::Result<()> {
    let provider = provider_client(config)?;
    let run =
        adintel_sync::start_scrape_run(pool, &provider, settings, advertiser_id, job_type).await?;
    tracing::info!(
        scrape_run_id = run.id,
        advertiser_id,
        job_type = %job_type,
        "scrape run started"
    );
    println!(
        "started {job_type} run {} for advertiser {advertiser_id} (provider run {})",
        run.id,
        run.external_run_id.as_deref().unwrap_or("-")
    );

    let Some((interval, max_attempts)) = poll else {
        return Ok(());
    };
    tracing::debug!(
        scrape_run_id = run.id,
        interval_secs = interval.as_secs(),
        max_attempts,
        "polling scrape run until terminal"
    );
    match adintel_sync::poll_until_terminal(
        pool,
        &provider,
        settings,
        run.id,
        interval,
        max_attempts,
    )
    .await?
    {
        Some(outcome) => print_outcome(&outcome),
        None => println!("run {} has no provider run id", run.id),
    }
    Ok(())
}

async fn run_sync(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    settings: &SyncSettings,
    run_id: i64,
) -> anyhow::Result<()> {
    let provider = provider_client(config)?;
    match adintel_sync::sync_scrape_run(pool, &provider, settings, run_id).await? {
        Some(outcome) => print_outcome(&outcome),
        None => println!("run {run_id} has no provider run id; nothing to sync"),
    }
    Ok(())
}

async fn run_sync_all(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    settings: &SyncSettings,
) -> anyhow::Result<()> {
    let provider = provider_client(config)?;
    let summary = adintel_sync::sync_all_running(pool, &provider, settings).await?;

    println!(
        "synced {} run(s): {} completed, {} failed, {} still running",
        summary.synced, summary.completed, summary.failed, summary.still_running
    );
    log_sync_failures(&summary.errors);
    Ok(())
}

async fn run_start_due(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    settings: &SyncSettings,
) -> anyhow::Result<()> {
    let provider = provider_client(config)?;
    let summary = adintel_sync::start_due_advertisers(pool, &provider, settings).await?;

    println!(
        "started {} run(s); {} skipped for budget, {} failed",
        summary.started, summary.skipped_budget, summary.failed
    );
    log_start_failures(&summary);
    Ok(())
}

fn log_sync_failures(failures: &[RunSyncFailure]) {
    for failure in failures {
        tracing::warn!(
            scrape_run_id = failure.scrape_run_id,
            error = %failure.error,
            "scrape run sync failed"
        );
    }
}

fn log_start_failures(summary: &StartDueSummary) {
    if summary.skipped_budget > 0 {
        tracing::warn!(
            skipped = summary.skipped_budget,
            "monthly budget exhausted; due advertisers left for next sweep"
        );
    }
    for failure in &summary.errors {
        tracing::warn!(
            advertiser_id = failure.advertiser_id,
            error = %failure.error,
            "scheduled scrape run failed to start"
        );
    }
}

async fn run_list(
    pool: &sqlx::PgPool,
    advertiser_id: Option<i64>,
    status: Option<&str>,
    limit: i64,
) -> anyhow::Result<()> {
    let status = status.map(RunStatus::try_from).transpose()?;
    let rows = adintel_db::list_scrape_runs(
        pool,
        &ScrapeRunFilter {
            advertiser_id,
            status,
            limit,
        },
    )
    .await?;

    if rows.is_empty() {
        println!("no scrape runs found");
        return Ok(());
    }

    println!(
        "{:<8}{:<12}{:<11}{:<11}{:<8}{:<8}{:<10}STARTED",
        "RUN", "ADVERTISER", "JOB", "STATUS", "FOUND", "NEW", "COST"
    );
    for row in &rows {
        println!("{}", format_run_line(row));
    }
    Ok(())
}

fn format_run_line(row: &ScrapeRunRow) -> String {
    let new = row.ads_new.map_or_else(|| "-".to_string(), |n| n.to_string());
    let cost = row
        .cost_usd_rounded()
        .map_or_else(|| "-".to_string(), |c| format!("${c}"));
    format!(
        "{:<8}{:<12}{:<11}{:<11}{:<8}{:<8}{:<10}{}",
        row.id,
        row.advertiser_id,
        row.job_type,
        row.status,
        row.ads_found,
        new,
        cost,
        row.started_at.format("%Y-%m-%d %H:%M")
    )
}

fn print_outcome(outcome: &SyncOutcome) {
    println!(
        "run {}: {} ({} found)",
        outcome.scrape_run_id, outcome.status, outcome.ads_found
    );
    if outcome.status.is_terminal() {
        println!(
            "  new {} / updated {} / cost ${}",
            outcome.ads_new.unwrap_or_default(),
            outcome.ads_updated.unwrap_or_default(),
            outcome.cost_usd.unwrap_or_default().round_dp(2)
        );
    }
    if let Some(message) = &outcome.error_message {
        println!("  error: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    #[test]
    fn run_line_shows_dashes_for_unfinished_runs() {
        let row = ScrapeRunRow {
            id: 12,
            advertiser_id: 4,
            job_type: "initial".to_string(),
            ads_found: 0,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
            ..sample_row()
        };

        let line = format_run_line(&row);
        let columns: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(
            columns,
            ["12", "4", "initial", "running", "0", "-", "-", "2026-03-01", "09:30"]
        );
    }

    #[test]
    fn run_line_rounds_cost() {
        let row = ScrapeRunRow {
            cost_usd: Some(Decimal::new(1234, 4)),
            ads_new: Some(3),
            status: "completed".to_string(),
            ..sample_row()
        };
        assert!(format_run_line(&row).contains("$0.12"));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs(f: impl FnOnce()) -> String {
        let captured = CapturedLog::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn sync_failures_are_logged_as_warnings() {
        let logs = capture_logs(|| {
            log_sync_failures(&[RunSyncFailure {
                scrape_run_id: 41,
                error: "provider timed out".to_string(),
            }]);
        });
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("scrape_run_id=41"), "{logs}");
        assert!(logs.contains("provider timed out"), "{logs}");
    }

    #[test]
    fn start_due_logs_budget_skips_and_failures() {
        let summary = StartDueSummary {
            started: 1,
            skipped_budget: 2,
            failed: 1,
            errors: vec![adintel_sync::StartFailure {
                advertiser_id: 9,
                error: "no scrape target".to_string(),
            }],
        };
        let logs = capture_logs(|| log_start_failures(&summary));
        assert!(logs.contains("skipped=2"), "{logs}");
        assert!(logs.contains("advertiser_id=9"), "{logs}");
        assert!(logs.contains("no scrape target"), "{logs}");
    }

    #[test]
    fn clean_sweeps_log_nothing() {
        let logs = capture_logs(|| {
            log_sync_failures(&[]);
            log_start_failures(&StartDueSummary::default());
        });
        assert!(logs.is_empty(), "{logs}");
    }

    fn uuid_nil() -> sqlx::types::Uuid {
        sqlx::types::Uuid::nil()
    }

    fn sample_row() -> ScrapeRunRow {
        ScrapeRunRow {
            id: 1,
            public_id: uuid_nil(),
            advertiser_id: 1,
            status: "running".to_string(),
            job_type: "scheduled".to_string(),
            external_run_id: None,
            external_dataset_id: None,
            ads_found: 3,
            ads_new: None,
            ads_updated: None,
            cost_usd: None,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            completed_at: None,
            error_message: None,
        }
    }
}
