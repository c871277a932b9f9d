use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Entry, EntryOutcome, EntryStatus};

/// Sent by payment confirmation once the entry fee has been captured.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateEntryRequest {
    pub competition_id: Uuid,

    pub participant_id: Uuid,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Payment reference must be between 1 and 255 characters"
    ))]
    pub payment_reference: String,

    #[validate(custom(function = "validate_amount"))]
    #[schema(value_type = String, example = "5.00")]
    pub amount: Decimal,
}

/// A participant's one-time self-report.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReportOutcomeRequest {
    /// Identity asserted by the calling UI; must own the entry.
    pub participant_id: Uuid,

    #[validate(custom(function = "validate_reportable_outcome"))]
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntryResponse {
    pub entry_id: Uuid,
    pub competition_id: Uuid,
    pub participant_id: Uuid,
    pub payment_reference: String,
    pub paid: bool,
    pub paid_at: DateTime<Utc>,
    #[schema(value_type = String, example = "5.00")]
    pub amount: Decimal,
    pub attempt_window_end: DateTime<Utc>,
    pub outcome_self: Option<EntryOutcome>,
    pub status: EntryStatus,
}

impl From<Entry> for EntryResponse {
    fn from(entry: Entry) -> Self {
        Self {
            entry_id: entry.entry_id,
            competition_id: entry.competition_id,
            participant_id: entry.participant_id,
            payment_reference: entry.payment_reference,
            paid: entry.paid,
            paid_at: entry.paid_at,
            amount: entry.amount,
            attempt_window_end: entry.attempt_window_end,
            outcome_self: entry.outcome_self,
            status: entry.status,
        }
    }
}

/// Polled by the participant UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EntryStatusResponse {
    pub entry_id: Uuid,
    pub status: EntryStatus,
    pub outcome_self: Option<EntryOutcome>,
    pub attempt_window_end: DateTime<Utc>,
    pub seconds_remaining: i64,
    /// True once a self-report can no longer be accepted because time ran out,
    /// whether or not the sweep has already expired the entry.
    pub window_closed: bool,
    pub message: Option<String>,
}

impl EntryStatusResponse {
    pub fn from_entry(entry: &Entry, now: DateTime<Utc>) -> Self {
        let window_closed = entry.status == EntryStatus::Expired
            || (entry.status == EntryStatus::AwaitingAttempt && entry.window_elapsed(now));
        let message = if window_closed {
            Some("The attempt window has closed.".to_string())
        } else {
            None
        };

        Self {
            entry_id: entry.entry_id,
            status: entry.status,
            outcome_self: entry.outcome_self,
            attempt_window_end: entry.attempt_window_end,
            seconds_remaining: entry.seconds_remaining(now),
            window_closed,
            message,
        }
    }
}

fn validate_amount(amount: &Decimal) -> Result<(), validator::ValidationError> {
    if amount.is_sign_negative() {
        let mut err = validator::ValidationError::new("invalid_amount");
        err.message = Some("Amount must not be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_reportable_outcome(outcome: &EntryOutcome) -> Result<(), validator::ValidationError> {
    if outcome.is_self_reportable() {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("invalid_outcome");
        err.message = Some("Outcome must be win or miss".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_auto_miss_cannot_be_self_reported() {
        let req = ReportOutcomeRequest {
            participant_id: Uuid::new_v4(),
            outcome: EntryOutcome::AutoMiss,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let req = CreateEntryRequest {
            competition_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            payment_reference: "pay-9".to_string(),
            amount: Decimal::new(-1, 0),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_flags_elapsed_window_before_sweep() {
        let now = Utc::now();
        let entry = Entry {
            entry_id: Uuid::new_v4(),
            competition_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            payment_reference: "pay-1".to_string(),
            paid: true,
            paid_at: now - Duration::hours(3),
            amount: Decimal::new(500, 2),
            attempt_window_end: now - Duration::hours(1),
            outcome_self: None,
            outcome_reported_at: None,
            status: EntryStatus::AwaitingAttempt,
            created_at: now - Duration::hours(3),
            updated_at: now - Duration::hours(3),
        };

        let status = EntryStatusResponse::from_entry(&entry, now);

        assert!(status.window_closed);
        assert_eq!(status.seconds_remaining, 0);
        assert!(status.message.is_some());
    }
}
