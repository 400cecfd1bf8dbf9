use std::net::SocketAddr;

use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Bearer token for the scrape provider. Optional so read-only commands
    /// (budget, recalculate) work without it.
    pub provider_token: Option<String>,
    pub provider_base_url: String,
    pub provider_actor_id: String,
    pub provider_timeout_secs: u64,
    pub provider_max_retries: u32,
    pub provider_retry_backoff_ms: u64,
    /// Provider charge per dataset item, in USD.
    pub cost_per_item_usd: Decimal,
    pub monthly_budget_usd: Decimal,
    /// Only runs started within this many hours are picked up by batch sync.
    pub sync_window_hours: i64,
    pub default_results_limit: Option<u32>,
    pub sync_cron: String,
    pub start_due_cron: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "provider_token",
                &self.provider_token.as_ref().map(|_| "[redacted]"),
            )
            .field("provider_base_url", &self.provider_base_url)
            .field("provider_actor_id", &self.provider_actor_id)
            .field("provider_timeout_secs", &self.provider_timeout_secs)
            .field("provider_max_retries", &self.provider_max_retries)
            .field("provider_retry_backoff_ms", &self.provider_retry_backoff_ms)
            .field("cost_per_item_usd", &self.cost_per_item_usd)
            .field("monthly_budget_usd", &self.monthly_budget_usd)
            .field("sync_window_hours", &self.sync_window_hours)
            .field("default_results_limit", &self.default_results_limit)
            .field("sync_cron", &self.sync_cron)
            .field("start_due_cron", &self.start_due_cron)
            .finish()
    }
}
