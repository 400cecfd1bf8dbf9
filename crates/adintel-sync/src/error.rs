use adintel_db::DbError;
use adintel_provider::ProviderError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failures from the start and sync flows.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Policy rejection from the budget guard. Nothing was started.
    #[error("monthly budget reached: spent {current_spend} of {limit} USD")]
    BudgetExceeded {
        current_spend: Decimal,
        limit: Decimal,
    },
}

/// Rejections from the follow state machine.
///
/// Every variant except [`FollowError::Db`] is raised before any row is
/// written and carries a stable [`code`](FollowError::code).
#[derive(Debug, Error)]
pub enum FollowError {
    #[error("advertiser {advertiser_id} is already tracked")]
    AlreadyTracked { advertiser_id: i64 },

    #[error("advertiser {advertiser_id} is not tracked")]
    NotTracked { advertiser_id: i64 },

    #[error("advertiser {advertiser_id} is {actual}, expected {expected}")]
    InvalidTransition {
        advertiser_id: i64,
        expected: &'static str,
        actual: String,
    },

    #[error("the current plan only allows manual scrapes")]
    ManualPlan,

    #[error("follow limit reached ({used} of {limit})")]
    FollowLimitReached { used: i64, limit: i64 },

    #[error("tracked advertiser limit reached ({used} of {limit})")]
    AdvertiserLimitReached { used: i64, limit: i64 },

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

impl FollowError {
    /// Machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            FollowError::AlreadyTracked { .. } => "already_tracked",
            FollowError::NotTracked { .. } => "not_tracked",
            FollowError::InvalidTransition { .. } => "invalid_transition",
            FollowError::ManualPlan => "manual_plan",
            FollowError::FollowLimitReached { .. } => "follow_limit_reached",
            FollowError::AdvertiserLimitReached { .. } => "advertiser_limit_reached",
            FollowError::Db(_) => "internal_error",
        }
    }

    /// `true` for policy rejections, `false` for infrastructure failures.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        !matches!(self, FollowError::Db(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            FollowError::AlreadyTracked { advertiser_id: 1 }.code(),
            "already_tracked"
        );
        assert_eq!(FollowError::ManualPlan.code(), "manual_plan");
        assert_eq!(
            FollowError::FollowLimitReached { used: 3, limit: 3 }.code(),
            "follow_limit_reached"
        );
        assert_eq!(
            FollowError::AdvertiserLimitReached { used: 5, limit: 5 }.code(),
            "advertiser_limit_reached"
        );
    }

    #[test]
    fn db_errors_are_not_conflicts() {
        assert!(!FollowError::Db(DbError::NotFound).is_conflict());
        assert!(FollowError::NotTracked { advertiser_id: 1 }.is_conflict());
    }

    #[test]
    fn budget_message_names_both_amounts() {
        let err = SyncError::BudgetExceeded {
            current_spend: Decimal::from(25),
            limit: Decimal::from(20),
        };
        assert_eq!(
            err.to_string(),
            "monthly budget reached: spent 25 of 20 USD"
        );
    }
}
