use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::entry::{EntryOutcome, EntryStatus, EntryTransition, lifecycle_value};
use crate::models::verification::{ReviewStatus, ReviewTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "audit_entity", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditEntity {
    Entry,
    Verification,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Verification => "verification",
        }
    }
}

impl fmt::Display for AuditEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Self::Entry),
            "verification" => Ok(Self::Verification),
            other => Err(format!("unknown audit entity type '{other}'")),
        }
    }
}

/// One row of the append-only ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub entity_type: AuditEntity,
    pub entity_id: Uuid,
    pub action: String,
    pub prior_value: Option<Value>,
    pub new_value: Option<Value>,
    /// `None` when the change was made by the system (sweep, reconciliation).
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// An audit event waiting to be written together with its transition.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub entity_type: AuditEntity,
    pub entity_id: Uuid,
    pub action: String,
    pub prior_value: Option<Value>,
    pub new_value: Option<Value>,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

impl NewAuditEvent {
    pub fn entry_created(entry_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Self {
        Self {
            entity_type: AuditEntity::Entry,
            entity_id: entry_id,
            action: "created".to_string(),
            prior_value: None,
            new_value: Some(lifecycle_value(EntryStatus::AwaitingAttempt, None)),
            actor_id,
            occurred_at: at,
        }
    }

    pub fn entry_transition(transition: &EntryTransition, actor_id: Option<Uuid>) -> Self {
        let action = match transition.outcome {
            EntryOutcome::AutoMiss => "auto_miss_applied",
            EntryOutcome::Win | EntryOutcome::Miss => "outcome_reported",
        };
        Self {
            entity_type: AuditEntity::Entry,
            entity_id: transition.entry_id,
            action: action.to_string(),
            prior_value: Some(lifecycle_value(transition.expected(), None)),
            new_value: Some(lifecycle_value(
                transition.target(),
                Some(transition.outcome),
            )),
            actor_id,
            occurred_at: transition.at,
        }
    }

    pub fn verification_created(entry_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Self {
        Self {
            entity_type: AuditEntity::Verification,
            entity_id: entry_id,
            action: "created".to_string(),
            prior_value: None,
            new_value: Some(review_value(ReviewStatus::Initiated)),
            actor_id,
            occurred_at: at,
        }
    }

    /// The prior status is only known once the store has matched the row, so it is
    /// passed in by the store rather than taken from the transition.
    pub fn review_transition(transition: &ReviewTransition, prior: ReviewStatus) -> Self {
        Self {
            entity_type: AuditEntity::Verification,
            entity_id: transition.entry_id,
            action: transition.action.as_str().to_string(),
            prior_value: Some(review_value(prior)),
            new_value: Some(review_value(transition.action.target())),
            actor_id: transition.actor_id,
            occurred_at: transition.at,
        }
    }

    pub fn evidence_attached(
        entry_id: Uuid,
        delta: Value,
        actor_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type: AuditEntity::Verification,
            entity_id: entry_id,
            action: "evidence_attached".to_string(),
            prior_value: None,
            new_value: Some(delta),
            actor_id,
            occurred_at: at,
        }
    }

    pub fn into_event(self, event_id: Uuid) -> AuditEvent {
        AuditEvent {
            event_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action: self.action,
            prior_value: self.prior_value,
            new_value: self.new_value,
            actor_id: self.actor_id,
            occurred_at: self.occurred_at,
        }
    }
}

fn review_value(status: ReviewStatus) -> Value {
    serde_json::json!({ "status": status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::verification::ReviewAction;
    use serde_json::json;

    #[test]
    fn test_expire_event_records_before_and_after() {
        let entry_id = Uuid::new_v4();
        let expire = EntryTransition::expire(entry_id, Utc::now());
        let event = NewAuditEvent::entry_transition(&expire, None);

        assert_eq!(event.entity_id, entry_id);
        assert_eq!(event.action, "auto_miss_applied");
        assert_eq!(
            event.prior_value,
            Some(json!({ "status": "awaiting_attempt", "outcome_self": null }))
        );
        assert_eq!(
            event.new_value,
            Some(json!({ "status": "expired", "outcome_self": "auto_miss" }))
        );
        assert_eq!(event.actor_id, None);
    }

    #[test]
    fn test_review_event_carries_reviewer() {
        let reviewer = Uuid::new_v4();
        let transition = ReviewTransition {
            entry_id: Uuid::new_v4(),
            action: ReviewAction::Reject,
            actor_id: Some(reviewer),
            at: Utc::now(),
            notes: None,
        };
        let event = NewAuditEvent::review_transition(&transition, ReviewStatus::UnderReview);

        assert_eq!(event.entity_type, AuditEntity::Verification);
        assert_eq!(event.action, "reject");
        assert_eq!(event.prior_value, Some(json!({ "status": "under_review" })));
        assert_eq!(event.new_value, Some(json!({ "status": "rejected" })));
        assert_eq!(event.actor_id, Some(reviewer));
    }

    #[test]
    fn test_entity_parses_from_path_segment() {
        assert_eq!("entry".parse::<AuditEntity>(), Ok(AuditEntity::Entry));
        assert!("athlete".parse::<AuditEntity>().is_err());
    }
}
