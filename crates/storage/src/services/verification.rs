use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dto::sweep::BacklogSummary;
use crate::error::{LifecycleError, LifecycleResult, StorageError};
use crate::models::{EntryOutcome, Evidence, NewAuditEvent, VerificationRecord};
use crate::repository::LifecycleStore;
use crate::services::entries::get_entry;
use crate::settings::{LifecycleSettings, deadline_after};

/// Create the verification record for a win claim, or return the existing one.
///
/// Safe to call any number of times, concurrently: the store performs an atomic
/// insert-or-return keyed by entry id, and only the call that inserts writes
/// an audit event.
pub async fn ensure(
    store: &dyn LifecycleStore,
    settings: &LifecycleSettings,
    entry_id: Uuid,
    actor_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> LifecycleResult<VerificationRecord> {
    let entry = get_entry(store, entry_id).await?;
    if entry.outcome_self != Some(EntryOutcome::Win) {
        return Err(LifecycleError::InvalidRequest(format!(
            "entry {entry_id} has not claimed a win"
        )));
    }

    let deadline = deadline_after(now, settings.verification_deadline)?;
    let template = VerificationRecord::initiated(entry_id, deadline, now);
    let audit = NewAuditEvent::verification_created(entry_id, actor_id, now);

    let (record, created) = store.ensure_verification(template, audit).await?;
    if created {
        tracing::info!(
            %entry_id,
            auto_miss_deadline = ?record.auto_miss_deadline,
            "Verification record initiated"
        );
    }

    Ok(record)
}

pub async fn get(
    store: &dyn LifecycleStore,
    entry_id: Uuid,
) -> LifecycleResult<VerificationRecord> {
    store
        .find_verification(entry_id)
        .await
        .map_err(|e| not_found_as_missing_record(e, entry_id))
}

/// Merge evidence into a record that has not reached a disposition yet.
pub async fn attach_evidence(
    store: &dyn LifecycleStore,
    entry_id: Uuid,
    evidence: &Evidence,
    submitted_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> LifecycleResult<VerificationRecord> {
    if evidence.is_empty() {
        return Err(LifecycleError::InvalidRequest(
            "no evidence supplied".to_string(),
        ));
    }

    let delta = serde_json::to_value(evidence)
        .map_err(|e| LifecycleError::InvalidRequest(format!("unserializable evidence: {e}")))?;
    let audit = NewAuditEvent::evidence_attached(entry_id, delta, submitted_by, now);

    match store.attach_evidence(entry_id, evidence, audit).await? {
        Some(record) => {
            tracing::info!(
                %entry_id,
                witnesses = evidence.witnesses.len(),
                documents = evidence.documents.len(),
                "Evidence attached"
            );
            Ok(record)
        }
        None => {
            let current = get(store, entry_id).await?;
            tracing::warn!(
                %entry_id,
                status = %current.status,
                "Evidence rejected for closed review"
            );
            Err(LifecycleError::EvidenceClosed {
                entry_id,
                status: current.status,
            })
        }
    }
}

/// Create a verification record for every win claim that lacks one, e.g. after
/// a crash between the outcome write and the record creation.
pub async fn ensure_backlog(
    store: &dyn LifecycleStore,
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> LifecycleResult<BacklogSummary> {
    let missing = store
        .list_wins_without_verification(settings.sweep_batch_size)
        .await?;
    let deadline = deadline_after(now, settings.verification_deadline)?;
    let mut summary = BacklogSummary::default();

    for entry in missing {
        let template = VerificationRecord::initiated(entry.entry_id, deadline, now);
        let audit = NewAuditEvent::verification_created(entry.entry_id, None, now);

        match store.ensure_verification(template, audit).await {
            Ok((_, true)) => {
                tracing::info!(entry_id = %entry.entry_id, "Backfilled verification record");
                summary.created += 1;
            }
            Ok((_, false)) => summary.already_present += 1,
            Err(e) => {
                tracing::error!(
                    entry_id = %entry.entry_id,
                    error = %e,
                    "Failed to backfill verification record"
                );
                summary.errored += 1;
                summary.failed_ids.push(entry.entry_id);
            }
        }
    }

    Ok(summary)
}

pub(crate) fn not_found_as_missing_record(error: StorageError, entry_id: Uuid) -> LifecycleError {
    match error {
        StorageError::NotFound => LifecycleError::VerificationNotFound(entry_id),
        other => other.into(),
    }
}
