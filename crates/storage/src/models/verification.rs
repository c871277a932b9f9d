use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "review_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Initiated,
    UnderReview,
    Verified,
    Rejected,
}

impl ReviewStatus {
    pub const NON_TERMINAL: [ReviewStatus; 2] = [Self::Initiated, Self::UnderReview];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::UnderReview => "under_review",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected)
    }

    /// Evidence may be attached until a disposition is reached.
    pub fn accepts_evidence(&self) -> bool {
        !self.is_terminal()
    }

    /// Actions the staff console should offer for a record in this status.
    pub fn allowed_actions(&self) -> Vec<ReviewAction> {
        ReviewAction::STAFF
            .into_iter()
            .filter(|action| action.expected().contains(self))
            .collect()
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A review-status change on a verification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    MoveToUnderReview,
    Approve,
    Reject,
    /// Sweep-driven: an overdue claim is handed to staff.
    Escalate,
    /// Sweep-driven: an overdue claim is closed as missed.
    AutoMiss,
}

impl ReviewAction {
    pub const STAFF: [ReviewAction; 3] = [Self::MoveToUnderReview, Self::Approve, Self::Reject];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoveToUnderReview => "move_to_under_review",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Escalate => "escalate",
            Self::AutoMiss => "auto_miss",
        }
    }

    /// Statuses the conditional update accepts as the prior state.
    pub fn expected(&self) -> &'static [ReviewStatus] {
        match self {
            Self::MoveToUnderReview | Self::Escalate | Self::AutoMiss => {
                &[ReviewStatus::Initiated]
            }
            Self::Approve | Self::Reject => &ReviewStatus::NON_TERMINAL,
        }
    }

    pub fn target(&self) -> ReviewStatus {
        match self {
            Self::MoveToUnderReview | Self::Escalate => ReviewStatus::UnderReview,
            Self::Approve => ReviewStatus::Verified,
            Self::Reject | Self::AutoMiss => ReviewStatus::Rejected,
        }
    }

    /// Whether the action records a final disposition (and stamps the reviewer).
    pub fn is_disposition(&self) -> bool {
        self.target().is_terminal()
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Witness {
    pub name: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DocumentRef {
    /// Location of the uploaded file; the file itself is owned by the upload service.
    pub uri: String,
    pub kind: String,
    pub captured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerificationRecord {
    pub entry_id: Uuid,
    pub status: ReviewStatus,
    pub witnesses: Vec<Witness>,
    pub documents: Vec<DocumentRef>,
    pub attempt_started_at: Option<DateTime<Utc>>,
    pub attempt_finished_at: Option<DateTime<Utc>>,
    /// Only meaningful while `initiated`; cleared once the record moves on.
    pub auto_miss_deadline: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn initiated(entry_id: Uuid, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            entry_id,
            status: ReviewStatus::Initiated,
            witnesses: Vec::new(),
            documents: Vec::new(),
            attempt_started_at: None,
            attempt_finished_at: None,
            auto_miss_deadline: Some(deadline),
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ReviewStatus::Initiated
            && self.auto_miss_deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Merge an evidence delta: lists append, timestamps overwrite when present.
    pub fn apply_evidence(&mut self, evidence: &Evidence, now: DateTime<Utc>) {
        self.witnesses.extend(evidence.witnesses.iter().cloned());
        self.documents.extend(evidence.documents.iter().cloned());
        if evidence.attempt_started_at.is_some() {
            self.attempt_started_at = evidence.attempt_started_at;
        }
        if evidence.attempt_finished_at.is_some() {
            self.attempt_finished_at = evidence.attempt_finished_at;
        }
        self.updated_at = now;
    }

    /// Apply a review transition the store has already matched against `expected()`.
    pub fn apply_review(&mut self, transition: &ReviewTransition) {
        self.status = transition.action.target();
        self.auto_miss_deadline = None;
        if transition.action.is_disposition() {
            self.reviewed_by = transition.actor_id;
            self.reviewed_at = Some(transition.at);
            self.review_notes = transition.notes.clone();
        }
        self.updated_at = transition.at;
    }
}

/// Incremental evidence supplied by the capture UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Evidence {
    #[serde(default)]
    pub witnesses: Vec<Witness>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    pub attempt_started_at: Option<DateTime<Utc>>,
    pub attempt_finished_at: Option<DateTime<Utc>>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
            && self.documents.is_empty()
            && self.attempt_started_at.is_none()
            && self.attempt_finished_at.is_none()
    }
}

/// Conditional update on a verification record:
/// `SET status = action.target() WHERE entry_id = .. AND status IN action.expected()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTransition {
    pub entry_id: Uuid,
    pub action: ReviewAction,
    /// `None` for sweep-driven transitions.
    pub actor_id: Option<Uuid>,
    pub at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl ReviewTransition {
    pub fn matches(&self, record: &VerificationRecord) -> bool {
        record.entry_id == self.entry_id && self.action.expected().contains(&record.status)
    }
}
