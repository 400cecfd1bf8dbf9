//! Monthly spend guard.
//!
//! Advisory only: it reads completed-run cost and decides, it never writes.
//! Runs already in flight keep accruing cost after the limit is crossed.

use adintel_db::{sum_completed_cost_between, DbError};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub ok: bool,
    pub current_spend: Decimal,
    pub limit: Decimal,
}

impl BudgetStatus {
    /// `ok` is `current_spend < limit`; reaching the limit exactly blocks.
    #[must_use]
    pub fn evaluate(current_spend: Decimal, limit: Decimal) -> Self {
        Self {
            ok: current_spend < limit,
            current_spend,
            limit,
        }
    }
}

/// Half-open UTC bounds `[first of month, first of next month)` around `now`.
#[must_use]
pub fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let first = today - Days::new(u64::from(today.day0()));
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (
        first.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    )
}

/// Sum of `cost_usd` over runs completed in the calendar month containing
/// `now`. Failed runs are not counted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn monthly_spend(pool: &PgPool, now: DateTime<Utc>) -> Result<Decimal, DbError> {
    let (from, until) = month_bounds(now);
    sum_completed_cost_between(pool, from, until).await
}

/// Current-month spend against `limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the spend query fails.
pub async fn check_budget(pool: &PgPool, limit: Decimal) -> Result<BudgetStatus, DbError> {
    let spend = monthly_spend(pool, Utc::now()).await?;
    let status = BudgetStatus::evaluate(spend, limit);
    if !status.ok {
        tracing::warn!(
            current_spend = %status.current_spend,
            limit = %status.limit,
            "monthly scrape budget reached"
        );
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn spend_at_or_over_limit_blocks() {
        assert!(!BudgetStatus::evaluate(Decimal::from(25), Decimal::from(20)).ok);
        assert!(!BudgetStatus::evaluate(Decimal::from(20), Decimal::from(20)).ok);
        assert!(BudgetStatus::evaluate(Decimal::new(1999, 2), Decimal::from(20)).ok);
    }

    #[test]
    fn month_bounds_cover_the_calendar_month() {
        let now = Utc.with_ymd_and_hms(2026, 2, 14, 13, 45, 0).unwrap();
        let (from, until) = month_bounds(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(until, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn month_bounds_roll_over_the_year() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).unwrap();
        let (from, until) = month_bounds(now);
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(until, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn first_instant_of_month_is_inside() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let (from, _) = month_bounds(now);
        assert_eq!(from, now);
    }
}
