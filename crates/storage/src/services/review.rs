use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{ReviewAction, ReviewTransition, VerificationRecord};
use crate::repository::LifecycleStore;
use crate::services::notify::{LifecycleNotification, Notifier};
use crate::services::verification;

pub async fn move_to_under_review(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    entry_id: Uuid,
    reviewer_id: Uuid,
    now: DateTime<Utc>,
) -> LifecycleResult<VerificationRecord> {
    apply(
        store,
        notifier,
        entry_id,
        ReviewAction::MoveToUnderReview,
        Some(reviewer_id),
        None,
        now,
    )
    .await
}

pub async fn approve(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    entry_id: Uuid,
    reviewer_id: Uuid,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> LifecycleResult<VerificationRecord> {
    apply(
        store,
        notifier,
        entry_id,
        ReviewAction::Approve,
        Some(reviewer_id),
        notes,
        now,
    )
    .await
}

pub async fn reject(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    entry_id: Uuid,
    reviewer_id: Uuid,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> LifecycleResult<VerificationRecord> {
    apply(
        store,
        notifier,
        entry_id,
        ReviewAction::Reject,
        Some(reviewer_id),
        notes,
        now,
    )
    .await
}

/// Run one review action as a conditional update.
///
/// When the guard does not match, the current record decides the answer:
/// a record already in the action's target state by a non-final step
/// (`under_review`) is returned unchanged, anything terminal is an
/// `InvalidTransition`.
pub(crate) async fn apply(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    entry_id: Uuid,
    action: ReviewAction,
    actor_id: Option<Uuid>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> LifecycleResult<VerificationRecord> {
    let transition = ReviewTransition {
        entry_id,
        action,
        actor_id,
        at: now,
        notes,
    };

    if let Some(record) = store.apply_review_transition(&transition).await? {
        tracing::info!(
            %entry_id,
            action = %action,
            status = %record.status,
            actor_id = ?actor_id,
            "Review transition applied"
        );
        if let Some(notification) = disposition_notification(&record, action, actor_id, now) {
            notifier.notify(notification).await;
        }
        return Ok(record);
    }

    let current = verification::get(store, entry_id).await?;
    if !current.status.is_terminal() && current.status == action.target() {
        tracing::debug!(%entry_id, action = %action, "Review transition already applied");
        return Ok(current);
    }

    tracing::warn!(
        %entry_id,
        action = %action,
        status = %current.status,
        "Rejected review transition"
    );
    Err(LifecycleError::InvalidTransition {
        entry_id,
        from: current.status,
        action,
    })
}

pub(crate) fn disposition_notification(
    record: &VerificationRecord,
    action: ReviewAction,
    actor_id: Option<Uuid>,
    at: DateTime<Utc>,
) -> Option<LifecycleNotification> {
    let entry_id = record.entry_id;
    match action {
        ReviewAction::Approve => Some(LifecycleNotification::WinVerified {
            entry_id,
            reviewer_id: actor_id,
            at,
        }),
        ReviewAction::Reject => Some(LifecycleNotification::WinRejected {
            entry_id,
            reviewer_id: actor_id,
            at,
        }),
        ReviewAction::AutoMiss => Some(LifecycleNotification::AutoMissApplied { entry_id, at }),
        ReviewAction::MoveToUnderReview | ReviewAction::Escalate => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditEntity, Entry, EntryOutcome, EntryStatus, ReviewStatus};
    use crate::repository::MemoryLifecycleStore;
    use crate::services::notify::RecordingNotifier;
    use crate::settings::LifecycleSettings;
    use rust_decimal::Decimal;

    async fn claimed_win(store: &MemoryLifecycleStore, now: DateTime<Utc>) -> Uuid {
        let entry = Entry {
            entry_id: Uuid::new_v4(),
            competition_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            payment_reference: Uuid::new_v4().to_string(),
            paid: true,
            paid_at: now,
            amount: Decimal::new(500, 2),
            attempt_window_end: now,
            outcome_self: Some(EntryOutcome::Win),
            outcome_reported_at: Some(now),
            status: EntryStatus::VerificationPending,
            created_at: now,
            updated_at: now,
        };
        let entry_id = entry.entry_id;
        store.put_entry_raw(entry);
        verification::ensure(store, &LifecycleSettings::default(), entry_id, None, now)
            .await
            .unwrap();
        entry_id
    }

    #[tokio::test]
    async fn test_full_review_writes_three_events() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let now = Utc::now();
        let reviewer = Uuid::new_v4();
        let entry_id = claimed_win(&store, now).await;

        move_to_under_review(&store, &notifier, entry_id, reviewer, now)
            .await
            .unwrap();
        let record = approve(&store, &notifier, entry_id, reviewer, Some("ok".into()), now)
            .await
            .unwrap();

        assert_eq!(record.status, ReviewStatus::Verified);
        assert_eq!(record.reviewed_by, Some(reviewer));
        assert_eq!(record.review_notes.as_deref(), Some("ok"));

        let events = store
            .list_audit_events(AuditEntity::Verification, entry_id)
            .await
            .unwrap();
        let actions: Vec<&str> = events.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["created", "move_to_under_review", "approve"]);
        assert!(events[1..].iter().all(|e| e.actor_id == Some(reviewer)));

        assert_eq!(
            notifier.sent(),
            vec![LifecycleNotification::WinVerified {
                entry_id,
                reviewer_id: Some(reviewer),
                at: now,
            }]
        );
    }

    #[tokio::test]
    async fn test_terminal_records_reject_every_action() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let now = Utc::now();
        let reviewer = Uuid::new_v4();
        let entry_id = claimed_win(&store, now).await;

        reject(&store, &notifier, entry_id, reviewer, None, now)
            .await
            .unwrap();

        for action in ReviewAction::STAFF {
            let err = apply(&store, &notifier, entry_id, action, Some(reviewer), None, now)
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    LifecycleError::InvalidTransition { from: ReviewStatus::Rejected, .. }
                ),
                "{action} should be invalid"
            );
        }

        let record = store.find_verification(entry_id).await.unwrap();
        assert_eq!(record.status, ReviewStatus::Rejected);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(
            store
                .list_audit_events(AuditEntity::Verification, entry_id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_repeated_move_to_under_review_is_a_no_op() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let now = Utc::now();
        let reviewer = Uuid::new_v4();
        let entry_id = claimed_win(&store, now).await;

        move_to_under_review(&store, &notifier, entry_id, reviewer, now)
            .await
            .unwrap();
        let again = move_to_under_review(&store, &notifier, entry_id, reviewer, now)
            .await
            .unwrap();

        assert_eq!(again.status, ReviewStatus::UnderReview);
        assert_eq!(
            store
                .list_audit_events(AuditEntity::Verification, entry_id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_review_without_record_is_invalid() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let id = Uuid::new_v4();

        let err = approve(&store, &notifier, id, Uuid::new_v4(), None, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::VerificationNotFound(missing) if missing == id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approve_and_reject_settle_once() {
        let store = std::sync::Arc::new(MemoryLifecycleStore::new());
        let notifier = std::sync::Arc::new(RecordingNotifier::default());
        let now = Utc::now();
        let entry_id = claimed_win(&store, now).await;

        let approve_task = {
            let store = store.clone();
            let notifier = notifier.clone();
            tokio::spawn(async move {
                let reviewer = Uuid::new_v4();
                approve(store.as_ref(), notifier.as_ref(), entry_id, reviewer, None, now).await
            })
        };
        let reject_task = {
            let store = store.clone();
            let notifier = notifier.clone();
            tokio::spawn(async move {
                reject(store.as_ref(), notifier.as_ref(), entry_id, Uuid::new_v4(), None, now).await
            })
        };

        let results = [approve_task.await.unwrap(), reject_task.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(winners, 1);
        assert_eq!(notifier.sent().len(), 1);
        assert!(store.find_verification(entry_id).await.unwrap().status.is_terminal());
    }
}
