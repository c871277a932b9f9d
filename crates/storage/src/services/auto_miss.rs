//! Timeout enforcement for entries and win claims.
//!
//! Deadlines are stored timestamps, so any number of sweep workers can run at
//! once: each candidate is moved with the same conditional update the outcome
//! reporter uses, and whoever loses simply skips it.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;

use crate::dto::sweep::{BatchSummary, SweepSummary};
use crate::error::LifecycleResult;
use crate::models::{EntryTransition, NewAuditEvent, ReviewAction, ReviewTransition};
use crate::repository::LifecycleStore;
use crate::services::notify::{LifecycleNotification, Notifier};
use crate::services::{review, verification};
use crate::settings::{LifecycleSettings, OverduePolicy};

const AUTO_MISS_NOTE: &str = "auto_miss: verification deadline elapsed";

/// Run one auto-miss pass over at most `sweep_batch_size` entries and as many
/// overdue verification records.
pub async fn run_sweep(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> LifecycleResult<SweepSummary> {
    let entries = expire_entries(store, notifier, settings, now).await?;
    let verifications = resolve_overdue_verifications(store, notifier, settings, now).await?;

    let summary = SweepSummary::new(now, entries, verifications, settings.overdue_policy);

    tracing::info!(
        processed = summary.processed,
        errored = summary.errored,
        expired = summary.entries.applied,
        claims_resolved = summary.verifications.applied,
        "Auto-miss sweep finished"
    );

    Ok(summary)
}

async fn expire_entries(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> LifecycleResult<BatchSummary> {
    let candidates = store
        .list_expired_entries(now, settings.sweep_batch_size)
        .await?;
    let mut summary = BatchSummary::default();

    for entry in candidates {
        let transition = EntryTransition::expire(entry.entry_id, now);
        let audit = NewAuditEvent::entry_transition(&transition, None);

        match store.apply_entry_transition(&transition, audit).await {
            Ok(Some(_)) => {
                tracing::info!(entry_id = %entry.entry_id, "Entry expired without a report");
                summary.record_applied();
                notifier
                    .notify(LifecycleNotification::AutoMissApplied {
                        entry_id: entry.entry_id,
                        at: now,
                    })
                    .await;
            }
            Ok(None) => {
                tracing::debug!(
                    entry_id = %entry.entry_id,
                    "Entry moved on before expiry; skipped"
                );
                summary.record_skipped();
            }
            Err(e) => {
                tracing::error!(entry_id = %entry.entry_id, error = %e, "Failed to expire entry");
                summary.record_failed(entry.entry_id);
            }
        }
    }

    Ok(summary)
}

async fn resolve_overdue_verifications(
    store: &dyn LifecycleStore,
    notifier: &dyn Notifier,
    settings: &LifecycleSettings,
    now: DateTime<Utc>,
) -> LifecycleResult<BatchSummary> {
    let candidates = store
        .list_overdue_verifications(now, settings.sweep_batch_size)
        .await?;
    let mut summary = BatchSummary::default();

    let (action, notes) = match settings.overdue_policy {
        OverduePolicy::Escalate => (ReviewAction::Escalate, None),
        OverduePolicy::AutoMiss => (ReviewAction::AutoMiss, Some(AUTO_MISS_NOTE.to_string())),
    };

    for record in candidates {
        let entry_id = record.entry_id;
        let transition = ReviewTransition {
            entry_id,
            action,
            actor_id: None,
            at: now,
            notes: notes.clone(),
        };

        match store.apply_review_transition(&transition).await {
            Ok(Some(updated)) => {
                tracing::info!(
                    %entry_id,
                    action = %action,
                    status = %updated.status,
                    "Overdue claim resolved"
                );
                summary.record_applied();
                if let Some(notification) =
                    review::disposition_notification(&updated, action, None, now)
                {
                    notifier.notify(notification).await;
                }
            }
            // Staff or another worker acted first.
            Ok(None) => {
                tracing::debug!(%entry_id, "Claim left initiated before the sweep; skipped");
                summary.record_skipped();
            }
            Err(e) => {
                tracing::error!(%entry_id, error = %e, "Failed to resolve overdue claim");
                summary.record_failed(entry_id);
            }
        }
    }

    Ok(summary)
}

/// Runs the sweep and the verification backlog on a fixed interval.
pub struct AutoMissScheduler {
    store: Arc<dyn LifecycleStore>,
    notifier: Arc<dyn Notifier>,
    settings: LifecycleSettings,
}

impl AutoMissScheduler {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        notifier: Arc<dyn Notifier>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    /// One tick: backlog reconciliation, then the sweep.
    pub async fn tick(&self, now: DateTime<Utc>) -> LifecycleResult<SweepSummary> {
        match verification::ensure_backlog(self.store.as_ref(), &self.settings, now).await {
            Ok(backlog) if backlog.created > 0 || backlog.errored > 0 => {
                tracing::info!(
                    created = backlog.created,
                    errored = backlog.errored,
                    "Verification backlog reconciled"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Verification backlog pass failed"),
        }

        run_sweep(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &self.settings,
            now,
        )
        .await
    }

    /// Tick until `shutdown` resolves. A failed tick is logged and retried on
    /// the next interval.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut interval = tokio::time::interval(self.settings.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.settings.sweep_interval.as_secs(),
            batch_size = self.settings.sweep_batch_size,
            policy = %self.settings.overdue_policy,
            "Auto-miss scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Auto-miss scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        tracing::error!(error = %e, "Auto-miss sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::entry::CreateEntryRequest;
    use crate::models::{AuditEntity, EntryOutcome, EntryStatus, ReviewStatus};
    use crate::repository::MemoryLifecycleStore;
    use crate::services::entries::create_entry;
    use crate::services::notify::RecordingNotifier;
    use crate::services::outcome::report_outcome;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    async fn new_entry(
        store: &MemoryLifecycleStore,
        settings: &LifecycleSettings,
        now: DateTime<Utc>,
    ) -> crate::models::Entry {
        let request = CreateEntryRequest {
            competition_id: Uuid::new_v4(),
            participant_id: Uuid::new_v4(),
            payment_reference: Uuid::new_v4().to_string(),
            amount: Decimal::new(500, 2),
        };
        create_entry(store, settings, &request, now).await.unwrap()
    }

    #[tokio::test]
    async fn test_sweep_expires_only_elapsed_unreported_entries() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings::default();
        let t0 = Utc::now();
        let abandoned = new_entry(&store, &settings, t0).await;
        let reported = new_entry(&store, &settings, t0).await;
        let fresh = new_entry(&store, &settings, t0 + Duration::hours(2)).await;
        let participant = reported.participant_id;
        report_outcome(&store, &settings, reported.entry_id, EntryOutcome::Miss, participant, t0)
            .await
            .unwrap();

        let summary = run_sweep(&store, &notifier, &settings, t0 + Duration::minutes(121))
            .await
            .unwrap();

        assert_eq!(summary.entries.applied, 1);
        assert_eq!(summary.entries.processed, 1);
        let expired = store.find_entry(abandoned.entry_id).await.unwrap();
        assert_eq!(expired.status, EntryStatus::Expired);
        assert_eq!(expired.outcome_self, Some(EntryOutcome::AutoMiss));
        assert_eq!(
            store.find_entry(fresh.entry_id).await.unwrap().status,
            EntryStatus::AwaitingAttempt
        );
        assert_eq!(
            notifier.sent(),
            vec![LifecycleNotification::AutoMissApplied {
                entry_id: abandoned.entry_id,
                at: t0 + Duration::minutes(121),
            }]
        );
    }

    #[tokio::test]
    async fn test_repeated_sweeps_are_idempotent() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings::default();
        let t0 = Utc::now();
        let entry = new_entry(&store, &settings, t0).await;
        let later = t0 + Duration::hours(3);

        run_sweep(&store, &notifier, &settings, later).await.unwrap();
        let after_first = store.find_entry(entry.entry_id).await.unwrap();
        for _ in 0..3 {
            let summary = run_sweep(&store, &notifier, &settings, later).await.unwrap();
            assert_eq!(summary.processed, 0);
        }

        assert_eq!(store.find_entry(entry.entry_id).await.unwrap(), after_first);
        let events = store
            .list_audit_events(AuditEntity::Entry, entry.entry_id)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, "auto_miss_applied");
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_size_bounds_each_run() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings {
            sweep_batch_size: 2,
            ..Default::default()
        };
        let t0 = Utc::now();
        for _ in 0..5 {
            new_entry(&store, &settings, t0).await;
        }
        let later = t0 + Duration::hours(3);

        let runs: Vec<usize> = {
            let mut runs = Vec::new();
            for _ in 0..4 {
                let summary = run_sweep(&store, &notifier, &settings, later).await.unwrap();
                runs.push(summary.entries.applied);
            }
            runs
        };

        assert_eq!(runs, vec![2, 2, 1, 0]);
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_abort_batch() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings::default();
        let t0 = Utc::now();
        let broken = new_entry(&store, &settings, t0).await;
        let healthy = new_entry(&store, &settings, t0).await;
        store.fail_audit_writes_for(broken.entry_id);

        let summary = run_sweep(&store, &notifier, &settings, t0 + Duration::hours(3))
            .await
            .unwrap();

        assert_eq!(summary.entries.applied, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.entries.failed_ids, vec![broken.entry_id]);
        assert_eq!(
            store.find_entry(broken.entry_id).await.unwrap().status,
            EntryStatus::AwaitingAttempt
        );
        assert_eq!(
            store.find_entry(healthy.entry_id).await.unwrap().status,
            EntryStatus::Expired
        );

        store.clear_faults();
        let retry = run_sweep(&store, &notifier, &settings, t0 + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(retry.entries.applied, 1);
        assert_eq!(retry.errored, 0);
    }

    async fn overdue_claim(
        store: &MemoryLifecycleStore,
        settings: &LifecycleSettings,
        t0: DateTime<Utc>,
    ) -> Uuid {
        let entry = new_entry(store, settings, t0).await;
        report_outcome(store, settings, entry.entry_id, EntryOutcome::Win, entry.participant_id, t0)
            .await
            .unwrap();
        entry.entry_id
    }

    #[tokio::test]
    async fn test_overdue_claim_is_escalated_by_default() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings::default();
        let t0 = Utc::now();
        let entry_id = overdue_claim(&store, &settings, t0).await;

        let summary = run_sweep(&store, &notifier, &settings, t0 + Duration::hours(73))
            .await
            .unwrap();

        assert_eq!(summary.verifications.applied, 1);
        let record = store.find_verification(entry_id).await.unwrap();
        assert_eq!(record.status, ReviewStatus::UnderReview);
        assert_eq!(record.auto_miss_deadline, None);
        assert_eq!(record.reviewed_by, None);
        let entry = store.find_entry(entry_id).await.unwrap();
        assert_eq!(entry.outcome_self, Some(EntryOutcome::Win));
        assert!(notifier.sent().is_empty());

        let events = store
            .list_audit_events(AuditEntity::Verification, entry_id)
            .await
            .unwrap();
        assert_eq!(events.last().map(|e| e.action.as_str()), Some("escalate"));
        assert_eq!(events.last().and_then(|e| e.actor_id), None);
    }

    #[tokio::test]
    async fn test_overdue_claim_auto_missed_under_auto_miss_policy() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings {
            overdue_policy: OverduePolicy::AutoMiss,
            ..Default::default()
        };
        let t0 = Utc::now();
        let entry_id = overdue_claim(&store, &settings, t0).await;
        let at = t0 + Duration::hours(73);

        let summary = run_sweep(&store, &notifier, &settings, at).await.unwrap();

        assert_eq!(summary.verifications.applied, 1);
        assert_eq!(summary.overdue_policy, OverduePolicy::AutoMiss);
        let record = store.find_verification(entry_id).await.unwrap();
        assert_eq!(record.status, ReviewStatus::Rejected);
        assert_eq!(record.review_notes.as_deref(), Some(AUTO_MISS_NOTE));
        assert_eq!(
            notifier.sent(),
            vec![LifecycleNotification::AutoMissApplied { entry_id, at }]
        );
        // The entry keeps its immutable outcome; the claim carries the disposition.
        let entry = store.find_entry(entry_id).await.unwrap();
        assert_eq!(entry.status, EntryStatus::VerificationPending);
        assert_eq!(entry.outcome_self, Some(EntryOutcome::Win));
    }

    #[tokio::test]
    async fn test_claims_under_review_are_not_touched() {
        let store = MemoryLifecycleStore::new();
        let notifier = RecordingNotifier::default();
        let settings = LifecycleSettings {
            overdue_policy: OverduePolicy::AutoMiss,
            ..Default::default()
        };
        let t0 = Utc::now();
        let entry_id = overdue_claim(&store, &settings, t0).await;
        review::move_to_under_review(&store, &notifier, entry_id, Uuid::new_v4(), t0)
            .await
            .unwrap();

        let summary = run_sweep(&store, &notifier, &settings, t0 + Duration::hours(100))
            .await
            .unwrap();

        assert_eq!(summary.verifications.processed, 0);
        assert_eq!(
            store.find_verification(entry_id).await.unwrap().status,
            ReviewStatus::UnderReview
        );
    }

    #[tokio::test]
    async fn test_scheduler_tick_heals_backlog_before_sweeping() {
        let store = Arc::new(MemoryLifecycleStore::new());
        let settings = LifecycleSettings::default();
        let t0 = Utc::now();
        let entry = new_entry(&store, &settings, t0).await;
        let transition = EntryTransition::self_report(entry.entry_id, EntryOutcome::Win, t0);
        store
            .apply_entry_transition(
                &transition,
                NewAuditEvent::entry_transition(&transition, Some(entry.participant_id)),
            )
            .await
            .unwrap()
            .unwrap();

        let scheduler = AutoMissScheduler::new(
            store.clone(),
            Arc::new(RecordingNotifier::default()),
            settings,
        );
        scheduler.tick(t0).await.unwrap();

        assert_eq!(
            store.find_verification(entry.entry_id).await.unwrap().status,
            ReviewStatus::Initiated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_shutdown() {
        let store = Arc::new(MemoryLifecycleStore::new());
        let scheduler = AutoMissScheduler::new(
            store,
            Arc::new(RecordingNotifier::default()),
            LifecycleSettings::default(),
        );
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(scheduler.run(async move {
            let _ = rx.await;
        }));
        tokio::time::sleep(std::time::Duration::from_secs(60 * 60)).await;
        tx.send(()).unwrap();

        handle.await.unwrap();
    }
}
