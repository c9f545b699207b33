//! Exchange configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AdexError, AdexResult};

/// What to do when a fill request names a requester with no account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequesterPolicy {
    /// Debit the advertiser, credit nobody
    #[default]
    Skip,
    /// Provision a zero-balance account for the requester and credit it
    AutoCreate,
}

impl FromStr for RequesterPolicy {
    type Err = AdexError;

    fn from_str(s: &str) -> AdexResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(RequesterPolicy::Skip),
            "auto-create" | "auto_create" | "autocreate" => Ok(RequesterPolicy::AutoCreate),
            other => Err(AdexError::InvalidConfig(format!(
                "unknown requester policy: {other}"
            ))),
        }
    }
}

impl fmt::Display for RequesterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequesterPolicy::Skip => f.write_str("skip"),
            RequesterPolicy::AutoCreate => f.write_str("auto-create"),
        }
    }
}

/// Bounded retry policy for optimistic-concurrency conflicts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total commit attempts per settlement (including the first)
    pub max_attempts: u32,
    /// Delay after the first conflict
    #[serde(with = "duration_str")]
    pub base_backoff: Duration,
    /// Upper bound on any single delay
    #[serde(with = "duration_str")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(20),
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

/// Allocator configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Credits granted to a newly registered application
    pub initial_grant: i64,
    /// Minimum balance an advertiser needs to be shown
    pub min_credits: i64,
    pub requester_policy: RequesterPolicy,
    pub retry: RetryPolicy,
    /// Fresh eligibility snapshots taken after a stale selection
    pub max_reselections: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            initial_grant: 100,
            min_credits: 1,
            requester_policy: RequesterPolicy::Skip,
            retry: RetryPolicy::default(),
            max_reselections: 3,
        }
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> AdexResult<()> {
        if self.min_credits < 1 {
            return Err(AdexError::InvalidConfig(format!(
                "min_credits must be at least 1, got {}",
                self.min_credits
            )));
        }
        if self.initial_grant < 0 {
            return Err(AdexError::InvalidConfig(format!(
                "initial_grant must not be negative, got {}",
                self.initial_grant
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(AdexError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.base_backoff > self.retry.max_backoff {
            return Err(AdexError::InvalidConfig(
                "retry.base_backoff exceeds retry.max_backoff".into(),
            ));
        }
        Ok(())
    }
}

/// Durations as human-readable strings ("250ms", "1s")
pub mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
