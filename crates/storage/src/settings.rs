use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{LifecycleError, LifecycleResult};

const MAX_ATTEMPT_WINDOW_DAYS: i64 = 30;
const MAX_VERIFICATION_DEADLINE_DAYS: i64 = 365;

/// What the sweep does with a win claim whose verification deadline passed
/// while the record was still `initiated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverduePolicy {
    /// Hand the claim to staff by moving it to `under_review`.
    #[default]
    Escalate,
    /// Close the claim as `rejected` with an auto-miss note.
    AutoMiss,
}

impl fmt::Display for OverduePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Escalate => f.write_str("escalate"),
            Self::AutoMiss => f.write_str("auto_miss"),
        }
    }
}

impl FromStr for OverduePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "escalate" => Ok(Self::Escalate),
            "auto_miss" | "auto-miss" => Ok(Self::AutoMiss),
            other => Err(format!(
                "unknown overdue verification policy '{other}' (expected escalate or auto_miss)"
            )),
        }
    }
}

/// Tunables of the entry lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Time between payment confirmation and the end of the attempt window.
    pub attempt_window: Duration,
    /// Time a win claim may sit in `initiated` before the sweep acts on it.
    pub verification_deadline: Duration,
    /// Upper bound on rows handled per sweep step.
    pub sweep_batch_size: i64,
    pub sweep_interval: StdDuration,
    pub overdue_policy: OverduePolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            attempt_window: Duration::minutes(120),
            verification_deadline: Duration::hours(72),
            sweep_batch_size: 100,
            sweep_interval: StdDuration::from_secs(15 * 60),
            overdue_policy: OverduePolicy::Escalate,
        }
    }
}

impl LifecycleSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.attempt_window <= Duration::zero() {
            return Err("attempt window must be positive".to_string());
        }
        if self.attempt_window > Duration::days(MAX_ATTEMPT_WINDOW_DAYS) {
            return Err(format!(
                "attempt window must not exceed {MAX_ATTEMPT_WINDOW_DAYS} days"
            ));
        }
        if self.verification_deadline <= Duration::zero() {
            return Err("verification deadline must be positive".to_string());
        }
        if self.verification_deadline > Duration::days(MAX_VERIFICATION_DEADLINE_DAYS) {
            return Err(format!(
                "verification deadline must not exceed {MAX_VERIFICATION_DEADLINE_DAYS} days"
            ));
        }
        if self.sweep_batch_size < 1 {
            return Err("sweep batch size must be >= 1".to_string());
        }
        if self.sweep_interval.is_zero() {
            return Err("sweep interval must be positive".to_string());
        }
        Ok(())
    }
}

/// `start + span`, refused instead of overflowing the calendar.
pub(crate) fn deadline_after(
    start: DateTime<Utc>,
    span: Duration,
) -> LifecycleResult<DateTime<Utc>> {
    start.checked_add_signed(span).ok_or_else(|| {
        LifecycleError::InvalidRequest(format!(
            "deadline {span} after {start} is out of range"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = LifecycleSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.overdue_policy, OverduePolicy::Escalate);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("auto-miss".parse(), Ok(OverduePolicy::AutoMiss));
        assert_eq!(" Escalate ".parse(), Ok(OverduePolicy::Escalate));
        assert!("ignore".parse::<OverduePolicy>().is_err());
    }

    #[test]
    fn test_rejects_empty_batch() {
        let settings = LifecycleSettings {
            sweep_batch_size: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_durations() {
        let window = LifecycleSettings {
            attempt_window: Duration::minutes(1_000_000_000_000),
            ..Default::default()
        };
        assert!(window.validate().is_err());

        let deadline = LifecycleSettings {
            verification_deadline: Duration::days(MAX_VERIFICATION_DEADLINE_DAYS + 1),
            ..Default::default()
        };
        assert!(deadline.validate().is_err());
    }

    #[test]
    fn test_deadline_after_refuses_overflow() {
        let now = Utc::now();
        assert_eq!(
            deadline_after(now, Duration::hours(1)).unwrap(),
            now + Duration::hours(1)
        );
        assert!(matches!(
            deadline_after(DateTime::<Utc>::MAX_UTC, Duration::minutes(1)),
            Err(LifecycleError::InvalidRequest(_))
        ));
    }
}
