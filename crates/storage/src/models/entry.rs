use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle status of a paid attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "entry_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    AwaitingAttempt,
    VerificationPending,
    Completed,
    Expired,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingAttempt => "awaiting_attempt",
            Self::VerificationPending => "verification_pending",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }

    /// Every status other than `awaiting_attempt` is final for the entry itself.
    /// The disposition of a pending win lives on its verification record.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::AwaitingAttempt)
    }

    /// Forward-only edges of the entry state machine.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::AwaitingAttempt,
                Self::VerificationPending | Self::Completed | Self::Expired
            )
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded on an entry. Unset is modelled as `None` on [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "entry_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    Win,
    Miss,
    AutoMiss,
}

impl EntryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Miss => "miss",
            Self::AutoMiss => "auto_miss",
        }
    }

    /// Status an entry moves to when this outcome is recorded.
    pub fn resulting_status(&self) -> EntryStatus {
        match self {
            Self::Win => EntryStatus::VerificationPending,
            Self::Miss => EntryStatus::Completed,
            Self::AutoMiss => EntryStatus::Expired,
        }
    }

    /// Outcomes a participant may claim. `auto_miss` is applied by the sweep only.
    pub fn is_self_reportable(&self) -> bool {
        matches!(self, Self::Win | Self::Miss)
    }
}

impl fmt::Display for EntryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Entry {
    pub entry_id: Uuid,
    pub competition_id: Uuid,
    pub participant_id: Uuid,
    pub payment_reference: String,
    pub paid: bool,
    pub paid_at: DateTime<Utc>,
    pub amount: Decimal,
    pub attempt_window_end: DateTime<Utc>,
    pub outcome_self: Option<EntryOutcome>,
    pub outcome_reported_at: Option<DateTime<Utc>>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.attempt_window_end
    }

    /// Seconds left in the attempt window, zero once it has elapsed or the
    /// entry has left `awaiting_attempt`.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.status != EntryStatus::AwaitingAttempt {
            return 0;
        }
        (self.attempt_window_end - now).num_seconds().max(0)
    }

    /// Snapshot of the lifecycle fields, as written to the audit ledger.
    pub fn lifecycle_value(&self) -> serde_json::Value {
        lifecycle_value(self.status, self.outcome_self)
    }
}

pub(crate) fn lifecycle_value(
    status: EntryStatus,
    outcome: Option<EntryOutcome>,
) -> serde_json::Value {
    serde_json::json!({
        "status": status,
        "outcome_self": outcome,
    })
}

/// Fields supplied by payment confirmation.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub entry_id: Uuid,
    pub competition_id: Uuid,
    pub participant_id: Uuid,
    pub payment_reference: String,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub attempt_window_end: DateTime<Utc>,
}

/// A guarded write that records an outcome on an entry.
///
/// Applied as `UPDATE entries SET status = to, outcome_self = outcome
/// WHERE entry_id = .. AND status = 'awaiting_attempt' [AND attempt_window_end > at]`.
/// At most one writer can match for a given entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTransition {
    pub entry_id: Uuid,
    pub outcome: EntryOutcome,
    pub at: DateTime<Utc>,
    /// When set, the write only matches while the attempt window is still open at this instant.
    pub require_open_window: bool,
}

impl EntryTransition {
    /// The only status an outcome can be written from.
    pub fn expected(&self) -> EntryStatus {
        EntryStatus::AwaitingAttempt
    }

    pub fn target(&self) -> EntryStatus {
        self.outcome.resulting_status()
    }

    /// Whether this write would match an entry in its current state.
    pub fn matches(&self, entry: &Entry) -> bool {
        entry.entry_id == self.entry_id
            && entry.status.can_transition_to(self.target())
            && entry.outcome_self.is_none()
            && (!self.require_open_window || !entry.window_elapsed(self.at))
    }

    pub fn self_report(entry_id: Uuid, outcome: EntryOutcome, at: DateTime<Utc>) -> Self {
        Self {
            entry_id,
            outcome,
            at,
            require_open_window: true,
        }
    }

    pub fn expire(entry_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            entry_id,
            outcome: EntryOutcome::AutoMiss,
            at,
            require_open_window: false,
        }
    }
}
