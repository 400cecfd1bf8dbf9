//! Lifecycle enums shared by the provider client, persistence, and sync layers.
//!
//! Every enum that is persisted as `TEXT` exposes `as_str()` (the exact column
//! value) and a `TryFrom<&str>` for decoding rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Merge semantics for a scrape run, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// First capture of an advertiser; existing ads get their creative overwritten.
    Initial,
    /// Recurring follow-scrape; existing ads only get liveness fields refreshed.
    Scheduled,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Initial => "initial",
            JobType::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobType {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "initial" => Ok(JobType::Initial),
            "scheduled" => Ok(JobType::Scheduled),
            other => Err(CoreError::InvalidEnumValue {
                kind: "job type",
                value: other.to_string(),
            }),
        }
    }
}

/// Persisted status of a `scrape_runs` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RunStatus {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::InvalidEnumValue {
                kind: "run status",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of a user's link to an advertiser.
///
/// `added → following → archived → following`; any non-archived link can be
/// removed (row deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Added,
    Following,
    Archived,
}

impl FollowStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FollowStatus::Added => "added",
            FollowStatus::Following => "following",
            FollowStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for FollowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FollowStatus {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "added" => Ok(FollowStatus::Added),
            "following" => Ok(FollowStatus::Following),
            "archived" => Ok(FollowStatus::Archived),
            other => Err(CoreError::InvalidEnumValue {
                kind: "follow status",
                value: other.to_string(),
            }),
        }
    }
}

/// Scrape cadence tier. Plans carry a default; users may override it.
///
/// Ordering is by demand: `Manual < Monthly < Weekly`, so `max()` over a set
/// of follower frequencies yields the most frequent tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeFrequency {
    Manual,
    Monthly,
    Weekly,
}

impl ScrapeFrequency {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeFrequency::Manual => "manual",
            ScrapeFrequency::Monthly => "monthly",
            ScrapeFrequency::Weekly => "weekly",
        }
    }

    /// Days between scheduled scrapes, or `None` for tiers that never schedule.
    #[must_use]
    pub fn interval_days(self) -> Option<i64> {
        match self {
            ScrapeFrequency::Weekly => Some(7),
            ScrapeFrequency::Monthly => Some(30),
            ScrapeFrequency::Manual => None,
        }
    }

    /// The most demanding tier across `frequencies`, or `None` when the set is
    /// empty or every entry is manual.
    pub fn best<I>(frequencies: I) -> Option<ScrapeFrequency>
    where
        I: IntoIterator<Item = ScrapeFrequency>,
    {
        frequencies
            .into_iter()
            .max()
            .filter(|f| f.interval_days().is_some())
    }
}

impl fmt::Display for ScrapeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ScrapeFrequency {
    type Error = CoreError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "weekly" => Ok(ScrapeFrequency::Weekly),
            "monthly" => Ok(ScrapeFrequency::Monthly),
            "manual" | "none" => Ok(ScrapeFrequency::Manual),
            other => Err(CoreError::InvalidEnumValue {
                kind: "scrape frequency",
                value: other.to_string(),
            }),
        }
    }
}

/// Run state as reported by the scrape provider.
///
/// Only `Succeeded`, `Failed`, `Aborted` and `TimedOut` are terminal; every
/// other value (including ones this client does not know) is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRunStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
    Aborting,
    Aborted,
    TimingOut,
    TimedOut,
    Other(String),
}

impl ProviderRunStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "READY" => ProviderRunStatus::Ready,
            "RUNNING" => ProviderRunStatus::Running,
            "SUCCEEDED" => ProviderRunStatus::Succeeded,
            "FAILED" => ProviderRunStatus::Failed,
            "ABORTING" => ProviderRunStatus::Aborting,
            "ABORTED" => ProviderRunStatus::Aborted,
            "TIMING-OUT" => ProviderRunStatus::TimingOut,
            "TIMED-OUT" => ProviderRunStatus::TimedOut,
            _ => ProviderRunStatus::Other(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ProviderRunStatus::Ready => "READY",
            ProviderRunStatus::Running => "RUNNING",
            ProviderRunStatus::Succeeded => "SUCCEEDED",
            ProviderRunStatus::Failed => "FAILED",
            ProviderRunStatus::Aborting => "ABORTING",
            ProviderRunStatus::Aborted => "ABORTED",
            ProviderRunStatus::TimingOut => "TIMING-OUT",
            ProviderRunStatus::TimedOut => "TIMED-OUT",
            ProviderRunStatus::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderRunStatus::Succeeded
                | ProviderRunStatus::Failed
                | ProviderRunStatus::Aborted
                | ProviderRunStatus::TimedOut
        )
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderRunStatus::Succeeded)
    }
}

impl fmt::Display for ProviderRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_frequency_prefers_weekly_over_monthly() {
        let best = ScrapeFrequency::best([ScrapeFrequency::Monthly, ScrapeFrequency::Weekly]);
        assert_eq!(best, Some(ScrapeFrequency::Weekly));
    }

    #[test]
    fn best_frequency_prefers_monthly_over_manual() {
        let best = ScrapeFrequency::best([ScrapeFrequency::Manual, ScrapeFrequency::Monthly]);
        assert_eq!(best, Some(ScrapeFrequency::Monthly));
    }

    #[test]
    fn best_frequency_is_none_for_no_followers() {
        assert_eq!(ScrapeFrequency::best(Vec::new()), None);
    }

    #[test]
    fn best_frequency_is_none_when_all_manual() {
        let best = ScrapeFrequency::best([ScrapeFrequency::Manual, ScrapeFrequency::Manual]);
        assert_eq!(best, None);
    }

    #[test]
    fn interval_days_match_tiers() {
        assert_eq!(ScrapeFrequency::Weekly.interval_days(), Some(7));
        assert_eq!(ScrapeFrequency::Monthly.interval_days(), Some(30));
        assert_eq!(ScrapeFrequency::Manual.interval_days(), None);
    }

    #[test]
    fn frequency_none_alias_decodes_as_manual() {
        assert_eq!(
            ScrapeFrequency::try_from("none").unwrap(),
            ScrapeFrequency::Manual
        );
    }

    #[test]
    fn provider_status_terminal_set() {
        for raw in ["SUCCEEDED", "FAILED", "ABORTED", "TIMED-OUT"] {
            assert!(ProviderRunStatus::parse(raw).is_terminal(), "{raw}");
        }
        for raw in ["READY", "RUNNING", "ABORTING", "TIMING-OUT", "SOMETHING-NEW"] {
            assert!(!ProviderRunStatus::parse(raw).is_terminal(), "{raw}");
        }
    }

    #[test]
    fn provider_status_parse_is_case_insensitive() {
        assert_eq!(
            ProviderRunStatus::parse("succeeded"),
            ProviderRunStatus::Succeeded
        );
    }

    #[test]
    fn unknown_provider_status_keeps_raw_value() {
        let status = ProviderRunStatus::parse("PAUSED");
        assert_eq!(status.as_str(), "PAUSED");
        assert!(!status.is_success());
    }

    #[test]
    fn run_status_round_trips_through_column_value() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(RunStatus::try_from("queued").is_err());
    }
}
