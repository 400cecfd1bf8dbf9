//! Schedule and budget command handlers for the CLI. Neither needs the
//! scrape provider.

use adintel_core::AppConfig;
use adintel_sync::{check_budget, month_bounds, SyncSettings};
use chrono::Utc;
use clap::Subcommand;

/// Sub-commands available under `schedule`.
#[derive(Debug, Subcommand)]
pub enum ScheduleCommands {
    /// Recompute an advertiser's frequency and next scrape from its followers
    Recalculate {
        /// Internal advertiser id
        advertiser_id: i64,
    },
    /// Show this month's provider spend against the budget
    Budget,
}

pub(crate) async fn dispatch(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: ScheduleCommands,
) -> anyhow::Result<()> {
    match command {
        ScheduleCommands::Recalculate { advertiser_id } => {
            run_recalculate(pool, advertiser_id).await
        }
        ScheduleCommands::Budget => run_budget(pool, &SyncSettings::from_app_config(config)).await,
    }
}

async fn run_recalculate(pool: &sqlx::PgPool, advertiser_id: i64) -> anyhow::Result<()> {
    let frequency = adintel_sync::recalculate_schedule(pool, advertiser_id).await?;
    let advertiser = adintel_db::get_advertiser(pool, advertiser_id).await?;

    match frequency {
        Some(frequency) => println!(
            "advertiser {advertiser_id}: {frequency}, next scrape {}",
            advertiser
                .next_scrape_at
                .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        ),
        None => {
            tracing::info!(advertiser_id, "no followers left; schedule cleared");
            println!("advertiser {advertiser_id}: no followers, schedule cleared");
        }
    }
    Ok(())
}

async fn run_budget(pool: &sqlx::PgPool, settings: &SyncSettings) -> anyhow::Result<()> {
    let status = check_budget(pool, settings.monthly_budget_usd).await?;
    let (start, end) = month_bounds(Utc::now());

    println!(
        "{} to {}: ${} of ${} spent",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d"),
        status.current_spend.round_dp(2),
        status.limit
    );
    if status.ok {
        println!("budget ok");
    } else {
        tracing::warn!(
            current_spend = %status.current_spend,
            limit = %status.limit,
            "monthly scrape budget exhausted"
        );
        println!("budget exhausted; new scrapes are refused until next month");
    }
    Ok(())
}
