//! Persistence for the entry lifecycle.
//!
//! Every mutating method is a single conditional write performed atomically
//! together with its audit event: either both land or neither does. A write
//! whose guard does not match the current row returns `Ok(None)` so the caller
//! can treat a lost race as a no-op.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AuditEntity, AuditEvent, Entry, EntryTransition, Evidence, NewAuditEvent, NewEntry,
    ReviewTransition, VerificationRecord,
};

pub use memory::MemoryLifecycleStore;
pub use postgres::PgLifecycleStore;

#[async_trait]
pub trait LifecycleStore: Send + Sync + 'static {
    /// Insert an entry, or return the one already created for the same payment
    /// reference. The flag is `true` when a row was inserted.
    async fn create_entry(&self, entry: NewEntry, audit: NewAuditEvent) -> Result<(Entry, bool)>;

    /// Returns `Err(StorageError::NotFound)` if the entry does not exist.
    async fn find_entry(&self, entry_id: Uuid) -> Result<Entry>;

    /// Conditional update `awaiting_attempt -> transition.target()`.
    async fn apply_entry_transition(
        &self,
        transition: &EntryTransition,
        audit: NewAuditEvent,
    ) -> Result<Option<Entry>>;

    /// Entries still `awaiting_attempt` whose window ended at or before `now`,
    /// earliest deadline first.
    async fn list_expired_entries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Entry>>;

    /// Entries whose outcome is `win` but which have no verification record.
    async fn list_wins_without_verification(&self, limit: i64) -> Result<Vec<Entry>>;

    /// Atomic insert-or-return-existing keyed by entry id. `audit` is written
    /// only when a row was inserted; the flag reports whether that happened.
    async fn ensure_verification(
        &self,
        record: VerificationRecord,
        audit: NewAuditEvent,
    ) -> Result<(VerificationRecord, bool)>;

    /// Returns `Err(StorageError::NotFound)` if no record exists for the entry.
    async fn find_verification(&self, entry_id: Uuid) -> Result<VerificationRecord>;

    /// Merge evidence into a record that is still `initiated` or `under_review`.
    async fn attach_evidence(
        &self,
        entry_id: Uuid,
        evidence: &Evidence,
        audit: NewAuditEvent,
    ) -> Result<Option<VerificationRecord>>;

    /// Conditional update on review status. The audit event is built by the
    /// store from the matched prior status.
    async fn apply_review_transition(
        &self,
        transition: &ReviewTransition,
    ) -> Result<Option<VerificationRecord>>;

    /// Records still `initiated` whose auto-miss deadline is at or before `now`.
    async fn list_overdue_verifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VerificationRecord>>;

    /// Audit trail of one entity, oldest first.
    async fn list_audit_events(
        &self,
        entity_type: AuditEntity,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>>;
}
