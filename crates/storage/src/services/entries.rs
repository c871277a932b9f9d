use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::entry::{CreateEntryRequest, EntryStatusResponse};
use crate::error::{LifecycleError, LifecycleResult, StorageError};
use crate::models::{Entry, NewAuditEvent, NewEntry};
use crate::repository::LifecycleStore;
use crate::settings::{LifecycleSettings, deadline_after};

/// Record a confirmed payment as a new entry. Retried confirmations carrying the
/// same payment reference return the entry created the first time.
pub async fn create_entry(
    store: &dyn LifecycleStore,
    settings: &LifecycleSettings,
    request: &CreateEntryRequest,
    now: DateTime<Utc>,
) -> LifecycleResult<Entry> {
    let new_entry = NewEntry {
        entry_id: Uuid::new_v4(),
        competition_id: request.competition_id,
        participant_id: request.participant_id,
        payment_reference: request.payment_reference.clone(),
        amount: request.amount,
        paid_at: now,
        attempt_window_end: deadline_after(now, settings.attempt_window)?,
    };
    let audit = NewAuditEvent::entry_created(new_entry.entry_id, None, now);

    let (entry, created) = store.create_entry(new_entry, audit).await?;

    if created {
        tracing::info!(
            entry_id = %entry.entry_id,
            participant_id = %entry.participant_id,
            attempt_window_end = %entry.attempt_window_end,
            "Entry created"
        );
    } else if entry.participant_id != request.participant_id
        || entry.competition_id != request.competition_id
    {
        return Err(LifecycleError::InvalidRequest(format!(
            "payment reference '{}' is already bound to another entry",
            request.payment_reference
        )));
    } else {
        tracing::debug!(entry_id = %entry.entry_id, "Payment confirmation replayed");
    }

    Ok(entry)
}

pub async fn get_entry(store: &dyn LifecycleStore, entry_id: Uuid) -> LifecycleResult<Entry> {
    store.find_entry(entry_id).await.map_err(|e| match e {
        StorageError::NotFound => LifecycleError::EntryNotFound(entry_id),
        other => other.into(),
    })
}

/// Current lifecycle status and outcome, as polled by the participant UI.
pub async fn get_entry_status(
    store: &dyn LifecycleStore,
    entry_id: Uuid,
    now: DateTime<Utc>,
) -> LifecycleResult<EntryStatusResponse> {
    let entry = get_entry(store, entry_id).await?;
    Ok(EntryStatusResponse::from_entry(&entry, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditEntity, EntryStatus};
    use crate::repository::MemoryLifecycleStore;
    use rust_decimal::Decimal;

    fn request(reference: &str) -> CreateEntryRequest {
        CreateEntryRequest {
            competition_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            payment_reference: reference.to_string(),
            amount: Decimal::new(1000, 2),
        }
    }

    #[tokio::test]
    async fn test_create_sets_window_and_audits_once() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();
        let req = request("pay-1");

        let entry = create_entry(&store, &settings, &req, now).await.unwrap();
        let replay = create_entry(&store, &settings, &req, now).await.unwrap();

        assert_eq!(entry.entry_id, replay.entry_id);
        assert_eq!(entry.status, EntryStatus::AwaitingAttempt);
        assert_eq!(entry.outcome_self, None);
        assert!(entry.paid);
        assert_eq!(entry.attempt_window_end, now + settings.attempt_window);

        let events = store
            .list_audit_events(AuditEntity::Entry, entry.entry_id)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "created");
    }

    #[tokio::test]
    async fn test_reused_payment_reference_for_other_participant_is_rejected() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings::default();
        let now = Utc::now();

        create_entry(&store, &settings, &request("pay-1"), now)
            .await
            .unwrap();
        let err = create_entry(&store, &settings, &request("pay-1"), now)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_oversized_window_is_refused_without_writing() {
        let store = MemoryLifecycleStore::new();
        let settings = LifecycleSettings {
            attempt_window: chrono::Duration::minutes(1_000_000_000_000),
            ..Default::default()
        };

        let err = create_entry(&store, &settings, &request("pay-huge"), Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::InvalidRequest(_)));
        assert!(store.audit_log().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_entry_is_reported_by_id() {
        let store = MemoryLifecycleStore::new();
        let id = Uuid::new_v4();

        let err = get_entry_status(&store, id, Utc::now()).await.unwrap_err();

        assert!(matches!(err, LifecycleError::EntryNotFound(missing) if missing == id));
    }
}
