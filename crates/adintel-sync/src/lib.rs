//! Scrape lifecycle orchestration.
//!
//! Everything here takes an explicit `&PgPool` (and a [`ProviderClient`]
//! where the provider is involved); nothing holds global state. The server
//! and CLI construct both handles at start-up and pass them in.
//!
//! [`ProviderClient`]: adintel_provider::ProviderClient

pub mod budget;
pub mod error;
pub mod follows;
pub mod reconciler;
pub mod start;
pub mod storage;
pub mod synchronizer;

use adintel_core::AppConfig;
use rust_decimal::Decimal;

pub use budget::{check_budget, month_bounds, monthly_spend, BudgetStatus};
pub use error::{FollowError, SyncError};
pub use follows::{
    add_advertiser, can_add, can_follow, follow, refollow, remove, unfollow, LimitCheck,
};
pub use reconciler::{plan_schedule, recalculate_schedule};
pub use start::{
    scrape_config_for, start_due_advertisers, start_scrape_run, StartDueSummary, StartFailure,
};
pub use storage::{store_ads, StoreResult};
pub use synchronizer::{
    poll_until_terminal, sync_all_running, sync_scrape_run, BatchSyncSummary, RunSyncFailure,
    SyncOutcome,
};

/// Cost, budget and batching knobs shared by the start and sync flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Provider charge per dataset item, in USD.
    pub cost_per_item_usd: Decimal,
    pub monthly_budget_usd: Decimal,
    /// Batch sync only picks up runs started within this many hours.
    pub sync_window_hours: i64,
    /// Result cap used when an advertiser carries no override.
    pub default_results_limit: Option<u32>,
}

impl SyncSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            cost_per_item_usd: config.cost_per_item_usd,
            monthly_budget_usd: config.monthly_budget_usd,
            sync_window_hours: config.sync_window_hours,
            default_results_limit: config.default_results_limit,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            cost_per_item_usd: Decimal::new(4, 3),
            monthly_budget_usd: Decimal::from(100),
            sync_window_hours: 24,
            default_results_limit: None,
        }
    }
}

/// Saturating `usize` to `i32` for row counters.
pub(crate) fn count_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
