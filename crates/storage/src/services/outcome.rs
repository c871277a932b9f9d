use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LifecycleError, LifecycleResult};
use crate::models::{Entry, EntryOutcome, EntryStatus, EntryTransition, NewAuditEvent};
use crate::repository::LifecycleStore;
use crate::services::entries::get_entry;
use crate::services::verification;
use crate::settings::LifecycleSettings;

/// Record a participant's one-time self-report.
///
/// The write is a conditional update that only matches while the entry is
/// `awaiting_attempt` and its window is still open, so a report racing the
/// auto-miss sweep either lands first or is refused; it is never applied late.
pub async fn report_outcome(
    store: &dyn LifecycleStore,
    settings: &LifecycleSettings,
    entry_id: Uuid,
    outcome: EntryOutcome,
    reporter_id: Uuid,
    now: DateTime<Utc>,
) -> LifecycleResult<Entry> {
    if !outcome.is_self_reportable() {
        return Err(LifecycleError::InvalidRequest(format!(
            "outcome '{outcome}' cannot be self-reported"
        )));
    }

    let entry = get_entry(store, entry_id).await?;
    if entry.participant_id != reporter_id {
        tracing::warn!(
            %entry_id,
            %reporter_id,
            "Self-report from a participant who does not own the entry"
        );
        return Err(LifecycleError::NotEntryParticipant {
            entry_id,
            participant_id: reporter_id,
        });
    }
    refuse_if_closed(&entry, now)?;

    let transition = EntryTransition::self_report(entry_id, outcome, now);
    let audit = NewAuditEvent::entry_transition(&transition, Some(reporter_id));

    let Some(updated) = store.apply_entry_transition(&transition, audit).await? else {
        // Another writer got there first; report what it did.
        let current = get_entry(store, entry_id).await?;
        refuse_if_closed(&current, now)?;
        return Err(LifecycleError::InvalidRequest(format!(
            "entry {entry_id} could not accept a report"
        )));
    };

    tracing::info!(
        %entry_id,
        outcome = %outcome,
        status = %updated.status,
        "Outcome self-reported"
    );

    if outcome == EntryOutcome::Win {
        // A failure here leaves a win without a record; the backlog sweep heals it.
        if let Err(e) =
            verification::ensure(store, settings, entry_id, Some(reporter_id), now).await
        {
            tracing::error!(
                %entry_id,
                error = %e,
                "Failed to initiate verification after win report"
            );
        }
    }

    Ok(updated)
}

/// Refusal for an entry that can no longer take a report.
fn refuse_if_closed(entry: &Entry, now: DateTime<Utc>) -> LifecycleResult<()> {
    match entry.status {
        EntryStatus::Expired => Err(LifecycleError::WindowClosed(entry.entry_id)),
        status if status.is_terminal() => Err(LifecycleError::AlreadyReported {
            entry_id: entry.entry_id,
            status,
        }),
        _ if entry.window_elapsed(now) => Err(LifecycleError::WindowClosed(entry.entry_id)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::entry::CreateEntryRequest;
    use crate::models::{AuditEntity, ReviewStatus};
    use crate::repository::MemoryLifecycleStore;
    use crate::services::entries::create_entry;
    use chrono::Duration;
    use rust_decimal::Decimal;

    async fn setup(store: &MemoryLifecycleStore, now: DateTime<Utc>) -> Entry {
        let request = CreateEntryRequest {
            competition_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            payment_reference: Uuid::new_v4().to_string(),
            amount: Decimal::new(500, 2),
        };
        create_entry(store, &LifecycleSettings::default(), &request, now)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_completes_entry() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();
        let entry = setup(&store, now).await;

        let updated = report_outcome(
            &store,
            &settings,
            entry.entry_id,
            EntryOutcome::Miss,
            entry.participant_id,
            now + Duration::hours(1),
        )
        .await
        .unwrap();

        assert_eq!(updated.status, EntryStatus::Completed);
        assert_eq!(updated.outcome_self, Some(EntryOutcome::Miss));
        assert!(store.find_verification(entry.entry_id).await.is_err());
    }

    #[tokio::test]
    async fn test_win_initiates_verification() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();
        let entry = setup(&store, now).await;
        let at = now + Duration::minutes(90);

        let updated = report_outcome(
            &store,
            &settings,
            entry.entry_id,
            EntryOutcome::Win,
            entry.participant_id,
            at,
        )
        .await
        .unwrap();

        assert_eq!(updated.status, EntryStatus::VerificationPending);
        let record = store.find_verification(entry.entry_id).await.unwrap();
        assert_eq!(record.status, ReviewStatus::Initiated);
        assert_eq!(record.auto_miss_deadline, Some(at + settings.verification_deadline));
    }

    #[tokio::test]
    async fn test_second_report_is_already_reported() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();
        let entry = setup(&store, now).await;

        let participant = entry.participant_id;
        report_outcome(&store, &settings, entry.entry_id, EntryOutcome::Miss, participant, now)
            .await
            .unwrap();
        let err = report_outcome(
            &store,
            &settings,
            entry.entry_id,
            EntryOutcome::Win,
            participant,
            now,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::AlreadyReported { status: EntryStatus::Completed, .. }
        ));
        let current = store.find_entry(entry.entry_id).await.unwrap();
        assert_eq!(current.outcome_self, Some(EntryOutcome::Miss));
        let entry_events = store
            .list_audit_events(AuditEntity::Entry, entry.entry_id)
            .await
            .unwrap();
        assert_eq!(entry_events.len(), 2);
    }

    #[tokio::test]
    async fn test_report_after_window_is_refused_before_sweep() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();
        let entry = setup(&store, now).await;

        let err = report_outcome(
            &store,
            &settings,
            entry.entry_id,
            EntryOutcome::Win,
            entry.participant_id,
            entry.attempt_window_end,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LifecycleError::WindowClosed(id) if id == entry.entry_id));
        let current = store.find_entry(entry.entry_id).await.unwrap();
        assert_eq!(current.status, EntryStatus::AwaitingAttempt);
        assert_eq!(current.outcome_self, None);
    }

    #[tokio::test]
    async fn test_only_owner_may_report() {
        let store = MemoryLifecycleStore::new();
        let now = Utc::now();
        let entry = setup(&store, now).await;

        let err = report_outcome(
            &store,
            &LifecycleSettings::default(),
            entry.entry_id,
            EntryOutcome::Win,
            Uuid::new_v4(),
            now,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LifecycleError::NotEntryParticipant { .. }));
    }

    #[tokio::test]
    async fn test_auto_miss_is_not_reportable() {
        let store = MemoryLifecycleStore::new();
        let now = Utc::now();
        let entry = setup(&store, now).await;

        let err = report_outcome(
            &store,
            &LifecycleSettings::default(),
            entry.entry_id,
            EntryOutcome::AutoMiss,
            entry.participant_id,
            now,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_audit_leaves_entry_untouched() {
        let store = MemoryLifecycleStore::new();
        let now = Utc::now();
        let entry = setup(&store, now).await;
        store.fail_audit_writes_for(entry.entry_id);

        let err = report_outcome(
            &store,
            &LifecycleSettings::default(),
            entry.entry_id,
            EntryOutcome::Win,
            entry.participant_id,
            now,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LifecycleError::Storage(_)));
        let current = store.find_entry(entry.entry_id).await.unwrap();
        assert_eq!(current.status, EntryStatus::AwaitingAttempt);
        assert_eq!(current.outcome_self, None);
        assert!(store.find_verification(entry.entry_id).await.is_err());
    }

    #[tokio::test]
    async fn test_win_without_record_is_healed_by_backlog() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();
        let entry = setup(&store, now).await;

        // The outcome write lands but the process dies before the record is created.
        let transition = EntryTransition::self_report(entry.entry_id, EntryOutcome::Win, now);
        store
            .apply_entry_transition(
                &transition,
                NewAuditEvent::entry_transition(&transition, Some(entry.participant_id)),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(store.find_verification(entry.entry_id).await.is_err());

        let summary = verification::ensure_backlog(&store, &settings, now).await.unwrap();

        assert_eq!(summary.created, 1);
        assert!(store.find_verification(entry.entry_id).await.is_ok());
    }
}
