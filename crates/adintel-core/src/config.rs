use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn parse_var<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("ADINTEL_ENV", "development"));

    let bind_addr: SocketAddr = parse_var(
        "ADINTEL_BIND_ADDR",
        &or_default("ADINTEL_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("ADINTEL_LOG_LEVEL", "info");

    let db_max_connections = parse_var(
        "ADINTEL_DB_MAX_CONNECTIONS",
        &or_default("ADINTEL_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_var(
        "ADINTEL_DB_MIN_CONNECTIONS",
        &or_default("ADINTEL_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_var(
        "ADINTEL_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("ADINTEL_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let provider_token = lookup("APIFY_TOKEN").ok().filter(|t| !t.trim().is_empty());
    let provider_base_url = or_default("ADINTEL_PROVIDER_BASE_URL", "https://api.apify.com/v2");
    let provider_actor_id = or_default(
        "ADINTEL_PROVIDER_ACTOR_ID",
        "silva95gustavo~linkedin-ad-library-scraper",
    );
    let provider_timeout_secs = parse_var(
        "ADINTEL_PROVIDER_TIMEOUT_SECS",
        &or_default("ADINTEL_PROVIDER_TIMEOUT_SECS", "30"),
    )?;
    let provider_max_retries = parse_var(
        "ADINTEL_PROVIDER_MAX_RETRIES",
        &or_default("ADINTEL_PROVIDER_MAX_RETRIES", "3"),
    )?;
    let provider_retry_backoff_ms = parse_var(
        "ADINTEL_PROVIDER_RETRY_BACKOFF_MS",
        &or_default("ADINTEL_PROVIDER_RETRY_BACKOFF_MS", "1000"),
    )?;

    let cost_per_item_usd: Decimal = parse_var(
        "ADINTEL_COST_PER_ITEM_USD",
        &or_default("ADINTEL_COST_PER_ITEM_USD", "0.004"),
    )?;
    let monthly_budget_usd: Decimal = parse_var(
        "ADINTEL_MONTHLY_BUDGET_USD",
        &or_default("ADINTEL_MONTHLY_BUDGET_USD", "100"),
    )?;
    if cost_per_item_usd.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar {
            var: "ADINTEL_COST_PER_ITEM_USD".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    let sync_window_hours: i64 = parse_var(
        "ADINTEL_SYNC_WINDOW_HOURS",
        &or_default("ADINTEL_SYNC_WINDOW_HOURS", "24"),
    )?;
    if sync_window_hours <= 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "ADINTEL_SYNC_WINDOW_HOURS".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let default_results_limit = match lookup("ADINTEL_DEFAULT_RESULTS_LIMIT") {
        Ok(raw) if !raw.trim().is_empty() => {
            Some(parse_var::<u32>("ADINTEL_DEFAULT_RESULTS_LIMIT", &raw)?)
        }
        _ => None,
    };

    let sync_cron = or_default("ADINTEL_SYNC_CRON", "0 */5 * * * *");
    let start_due_cron = or_default("ADINTEL_START_DUE_CRON", "0 0 * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        provider_token,
        provider_base_url,
        provider_actor_id,
        provider_timeout_secs,
        provider_max_retries,
        provider_retry_backoff_ms,
        cost_per_item_usd,
        monthly_budget_usd,
        sync_window_hours,
        default_results_limit,
        sync_cron,
        start_due_cron,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
