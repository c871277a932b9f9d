use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::LifecycleStore;
use crate::error::{Result, StorageError};
use crate::models::{
    AuditEntity, AuditEvent, Entry, EntryOutcome, EntryStatus, EntryTransition, Evidence,
    NewAuditEvent, NewEntry, ReviewTransition, VerificationRecord,
};

#[derive(Default)]
struct State {
    entries: HashMap<Uuid, Entry>,
    by_payment_reference: HashMap<String, Uuid>,
    verifications: HashMap<Uuid, VerificationRecord>,
    audit: Vec<AuditEvent>,
    failing_audit: HashSet<Uuid>,
}

impl State {
    /// Checks the injected faults before anything is mutated, so a failing
    /// audit write leaves the whole transition unapplied.
    fn check_audit(&self, audit: &NewAuditEvent) -> Result<()> {
        if self.failing_audit.contains(&audit.entity_id) {
            return Err(StorageError::Backend(format!(
                "audit write rejected for {} {}",
                audit.entity_type, audit.entity_id
            )));
        }
        Ok(())
    }

    fn push_audit(&mut self, audit: NewAuditEvent) {
        self.audit.push(audit.into_event(Uuid::new_v4()));
    }
}

/// In-process store with the same compare-and-set semantics as the Postgres
/// store. Each method holds the lock for the whole read-check-write, which
/// plays the role of the single-row atomic update.
#[derive(Default)]
pub struct MemoryLifecycleStore {
    state: Mutex<State>,
}

impl MemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit write for `entity_id` fail with a backend error.
    pub fn fail_audit_writes_for(&self, entity_id: Uuid) {
        self.lock().failing_audit.insert(entity_id);
    }

    pub fn clear_faults(&self) {
        self.lock().failing_audit.clear();
    }

    /// The full ledger in insertion order.
    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.lock().audit.clone()
    }

    /// Overwrite an entry directly, bypassing guards and audit.
    pub fn put_entry_raw(&self, entry: Entry) {
        let mut state = self.lock();
        state
            .by_payment_reference
            .insert(entry.payment_reference.clone(), entry.entry_id);
        state.entries.insert(entry.entry_id, entry);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-write; the maps are still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LifecycleStore for MemoryLifecycleStore {
    async fn create_entry(&self, entry: NewEntry, audit: NewAuditEvent) -> Result<(Entry, bool)> {
        let mut state = self.lock();

        if let Some(existing) = state
            .by_payment_reference
            .get(&entry.payment_reference)
            .and_then(|id| state.entries.get(id))
        {
            return Ok((existing.clone(), false));
        }
        if state.entries.contains_key(&entry.entry_id) {
            return Err(StorageError::ConstraintViolation(
                "Entry id already exists".to_string(),
            ));
        }
        state.check_audit(&audit)?;

        let created = Entry {
            entry_id: entry.entry_id,
            competition_id: entry.competition_id,
            participant_id: entry.participant_id,
            payment_reference: entry.payment_reference,
            paid: true,
            paid_at: entry.paid_at,
            amount: entry.amount,
            attempt_window_end: entry.attempt_window_end,
            outcome_self: None,
            outcome_reported_at: None,
            status: EntryStatus::AwaitingAttempt,
            created_at: entry.paid_at,
            updated_at: entry.paid_at,
        };
        state
            .by_payment_reference
            .insert(created.payment_reference.clone(), created.entry_id);
        state.entries.insert(created.entry_id, created.clone());
        state.push_audit(audit);

        Ok((created, true))
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Entry> {
        self.lock()
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn apply_entry_transition(
        &self,
        transition: &EntryTransition,
        audit: NewAuditEvent,
    ) -> Result<Option<Entry>> {
        let mut state = self.lock();

        let matched = state
            .entries
            .get(&transition.entry_id)
            .is_some_and(|entry| transition.matches(entry));
        if !matched {
            return Ok(None);
        }
        state.check_audit(&audit)?;

        let updated = match state.entries.get_mut(&transition.entry_id) {
            Some(entry) => {
                entry.status = transition.target();
                entry.outcome_self = Some(transition.outcome);
                entry.outcome_reported_at = Some(transition.at);
                entry.updated_at = transition.at;
                entry.clone()
            }
            None => return Ok(None),
        };
        state.push_audit(audit);

        Ok(Some(updated))
    }

    async fn list_expired_entries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Entry>> {
        let state = self.lock();
        let mut expired: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::AwaitingAttempt && e.attempt_window_end <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|e| (e.attempt_window_end, e.entry_id));
        expired.truncate(limit.max(0) as usize);
        Ok(expired)
    }

    async fn list_wins_without_verification(&self, limit: i64) -> Result<Vec<Entry>> {
        let state = self.lock();
        let mut missing: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| {
                e.outcome_self == Some(EntryOutcome::Win)
                    && !state.verifications.contains_key(&e.entry_id)
            })
            .cloned()
            .collect();
        missing.sort_by_key(|e| (e.outcome_reported_at, e.entry_id));
        missing.truncate(limit.max(0) as usize);
        Ok(missing)
    }

    async fn ensure_verification(
        &self,
        record: VerificationRecord,
        audit: NewAuditEvent,
    ) -> Result<(VerificationRecord, bool)> {
        let mut state = self.lock();

        if let Some(existing) = state.verifications.get(&record.entry_id) {
            return Ok((existing.clone(), false));
        }
        if !state.entries.contains_key(&record.entry_id) {
            return Err(StorageError::ConstraintViolation(
                "Verification record references unknown entry".to_string(),
            ));
        }
        state.check_audit(&audit)?;

        state.verifications.insert(record.entry_id, record.clone());
        state.push_audit(audit);

        Ok((record, true))
    }

    async fn find_verification(&self, entry_id: Uuid) -> Result<VerificationRecord> {
        self.lock()
            .verifications
            .get(&entry_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn attach_evidence(
        &self,
        entry_id: Uuid,
        evidence: &Evidence,
        audit: NewAuditEvent,
    ) -> Result<Option<VerificationRecord>> {
        let mut state = self.lock();

        let open = state
            .verifications
            .get(&entry_id)
            .is_some_and(|record| record.status.accepts_evidence());
        if !open {
            return Ok(None);
        }
        state.check_audit(&audit)?;

        let now = audit.occurred_at;
        let updated = match state.verifications.get_mut(&entry_id) {
            Some(record) => {
                record.apply_evidence(evidence, now);
                record.clone()
            }
            None => return Ok(None),
        };
        state.push_audit(audit);

        Ok(Some(updated))
    }

    async fn apply_review_transition(
        &self,
        transition: &ReviewTransition,
    ) -> Result<Option<VerificationRecord>> {
        let mut state = self.lock();

        let prior = match state.verifications.get(&transition.entry_id) {
            Some(record) if transition.matches(record) => record.status,
            _ => return Ok(None),
        };
        let audit = NewAuditEvent::review_transition(transition, prior);
        state.check_audit(&audit)?;

        let updated = match state.verifications.get_mut(&transition.entry_id) {
            Some(record) => {
                record.apply_review(transition);
                record.clone()
            }
            None => return Ok(None),
        };
        state.push_audit(audit);

        Ok(Some(updated))
    }

    async fn list_overdue_verifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VerificationRecord>> {
        let state = self.lock();
        let mut overdue: Vec<VerificationRecord> = state
            .verifications
            .values()
            .filter(|r| r.is_overdue(now))
            .cloned()
            .collect();
        overdue.sort_by_key(|r| (r.auto_miss_deadline, r.entry_id));
        overdue.truncate(limit.max(0) as usize);
        Ok(overdue)
    }

    async fn list_audit_events(
        &self,
        entity_type: AuditEntity,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>> {
        let mut events: Vec<AuditEvent> = self
            .lock()
            .audit
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order.
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}
