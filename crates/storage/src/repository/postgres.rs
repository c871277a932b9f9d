use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::LifecycleStore;
use crate::error::{Result, StorageError};
use crate::models::{
    AuditEntity, AuditEvent, DocumentRef, Entry, EntryStatus, EntryTransition, Evidence,
    NewAuditEvent, NewEntry, ReviewStatus, ReviewTransition, VerificationRecord, Witness,
};

const ENTRY_COLUMNS: &str = r#"
    entry_id, competition_id, participant_id, payment_reference, paid, paid_at, amount,
    attempt_window_end, outcome_self, outcome_reported_at, status, created_at, updated_at
"#;

const VERIFICATION_COLUMNS: &str = r#"
    entry_id, status, witnesses, documents, attempt_started_at, attempt_finished_at,
    auto_miss_deadline, reviewed_by, reviewed_at, review_notes, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct VerificationRow {
    entry_id: Uuid,
    status: ReviewStatus,
    witnesses: Json<Vec<Witness>>,
    documents: Json<Vec<DocumentRef>>,
    attempt_started_at: Option<DateTime<Utc>>,
    attempt_finished_at: Option<DateTime<Utc>>,
    auto_miss_deadline: Option<DateTime<Utc>>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VerificationRow> for VerificationRecord {
    fn from(row: VerificationRow) -> Self {
        Self {
            entry_id: row.entry_id,
            status: row.status,
            witnesses: row.witnesses.0,
            documents: row.documents.0,
            attempt_started_at: row.attempt_started_at,
            attempt_finished_at: row.attempt_finished_at,
            auto_miss_deadline: row.auto_miss_deadline,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            review_notes: row.review_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Lifecycle store backed by Postgres.
///
/// Each transition runs `UPDATE .. WHERE <expected state> RETURNING ..` and the
/// audit insert inside one transaction; zero returned rows means the guard lost.
#[derive(Clone)]
pub struct PgLifecycleStore {
    pool: PgPool,
}

impl PgLifecycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_audit(tx: &mut Transaction<'_, Postgres>, audit: NewAuditEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_events (
            event_id, entity_type, entity_id, action, prior_value, new_value, actor_id, occurred_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(audit.entity_type)
    .bind(audit.entity_id)
    .bind(&audit.action)
    .bind(&audit.prior_value)
    .bind(&audit.new_value)
    .bind(audit.actor_id)
    .bind(audit.occurred_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn status_names(statuses: &[ReviewStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl LifecycleStore for PgLifecycleStore {
    async fn create_entry(&self, entry: NewEntry, audit: NewAuditEvent) -> Result<(Entry, bool)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Entry>(&format!(
            r#"
            INSERT INTO entries (
                entry_id, competition_id, participant_id, payment_reference, paid, paid_at,
                amount, attempt_window_end, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7, 'awaiting_attempt', $5, $5)
            ON CONFLICT (payment_reference) DO NOTHING
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(entry.entry_id)
        .bind(entry.competition_id)
        .bind(entry.participant_id)
        .bind(&entry.payment_reference)
        .bind(entry.paid_at)
        .bind(entry.amount)
        .bind(entry.attempt_window_end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| match StorageError::from(e) {
            err if err.is_unique_violation() => {
                StorageError::ConstraintViolation("Entry id already exists".to_string())
            }
            err => err,
        })?;

        let result = match inserted {
            Some(created) => {
                insert_audit(&mut tx, audit).await?;
                (created, true)
            }
            None => {
                let existing = sqlx::query_as::<_, Entry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries WHERE payment_reference = $1"
                ))
                .bind(&entry.payment_reference)
                .fetch_one(&mut *tx)
                .await?;
                (existing, false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Entry> {
        let entry = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE entry_id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        Ok(entry)
    }

    async fn apply_entry_transition(
        &self,
        transition: &EntryTransition,
        audit: NewAuditEvent,
    ) -> Result<Option<Entry>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Entry>(&format!(
            r#"
            UPDATE entries
            SET status = $2, outcome_self = $3, outcome_reported_at = $4, updated_at = $4
            WHERE entry_id = $1
              AND status = $5
              AND outcome_self IS NULL
              AND (NOT $6 OR attempt_window_end > $4)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(transition.entry_id)
        .bind(transition.target())
        .bind(transition.outcome)
        .bind(transition.at)
        .bind(transition.expected())
        .bind(transition.require_open_window)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(entry) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(Some(entry))
    }

    async fn list_expired_entries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM entries
            WHERE status = $1 AND attempt_window_end <= $2
            ORDER BY attempt_window_end ASC, entry_id ASC
            LIMIT $3
            "#
        ))
        .bind(EntryStatus::AwaitingAttempt)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn list_wins_without_verification(&self, limit: i64) -> Result<Vec<Entry>> {
        let entries = sqlx::query_as::<_, Entry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM entries e
            WHERE e.outcome_self = 'win'
              AND NOT EXISTS (
                  SELECT 1 FROM verification_records v WHERE v.entry_id = e.entry_id
              )
            ORDER BY e.outcome_reported_at ASC, e.entry_id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn ensure_verification(
        &self,
        record: VerificationRecord,
        audit: NewAuditEvent,
    ) -> Result<(VerificationRecord, bool)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, VerificationRow>(&format!(
            r#"
            INSERT INTO verification_records (
                entry_id, status, witnesses, documents, auto_miss_deadline, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (entry_id) DO NOTHING
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(record.entry_id)
        .bind(record.status)
        .bind(Json(&record.witnesses))
        .bind(Json(&record.documents))
        .bind(record.auto_miss_deadline)
        .bind(record.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| match StorageError::from(e) {
            err if err.is_foreign_key_violation() => StorageError::ConstraintViolation(
                "Verification record references unknown entry".to_string(),
            ),
            err => err,
        })?;

        let result = match inserted {
            Some(row) => {
                insert_audit(&mut tx, audit).await?;
                (VerificationRecord::from(row), true)
            }
            None => {
                // The conflicting insert has committed by the time ON CONFLICT
                // returns, so this statement's snapshot sees it.
                let row = sqlx::query_as::<_, VerificationRow>(&format!(
                    "SELECT {VERIFICATION_COLUMNS} FROM verification_records WHERE entry_id = $1"
                ))
                .bind(record.entry_id)
                .fetch_one(&mut *tx)
                .await?;
                (VerificationRecord::from(row), false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn find_verification(&self, entry_id: Uuid) -> Result<VerificationRecord> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verification_records WHERE entry_id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound)?;

        Ok(row.into())
    }

    async fn attach_evidence(
        &self,
        entry_id: Uuid,
        evidence: &Evidence,
        audit: NewAuditEvent,
    ) -> Result<Option<VerificationRecord>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, VerificationRow>(&format!(
            r#"
            UPDATE verification_records
            SET witnesses = witnesses || $2,
                documents = documents || $3,
                attempt_started_at = COALESCE($4, attempt_started_at),
                attempt_finished_at = COALESCE($5, attempt_finished_at),
                updated_at = $6
            WHERE entry_id = $1 AND status::text = ANY($7)
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(entry_id)
        .bind(Json(&evidence.witnesses))
        .bind(Json(&evidence.documents))
        .bind(evidence.attempt_started_at)
        .bind(evidence.attempt_finished_at)
        .bind(audit.occurred_at)
        .bind(status_names(&ReviewStatus::NON_TERMINAL))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        insert_audit(&mut tx, audit).await?;
        tx.commit().await?;

        Ok(Some(row.into()))
    }

    async fn apply_review_transition(
        &self,
        transition: &ReviewTransition,
    ) -> Result<Option<VerificationRecord>> {
        let mut tx = self.pool.begin().await?;

        #[derive(FromRow)]
        struct Transitioned {
            prior_status: ReviewStatus,
            #[sqlx(flatten)]
            row: VerificationRow,
        }

        let disposition = transition.action.is_disposition();
        let updated = sqlx::query_as::<_, Transitioned>(&format!(
            r#"
            WITH prior AS (
                SELECT entry_id, status
                FROM verification_records
                WHERE entry_id = $1
                FOR UPDATE
            )
            UPDATE verification_records v
            SET status = $2,
                auto_miss_deadline = NULL,
                reviewed_by = CASE WHEN $3 THEN $4 ELSE v.reviewed_by END,
                reviewed_at = CASE WHEN $3 THEN $5 ELSE v.reviewed_at END,
                review_notes = CASE WHEN $3 THEN $6 ELSE v.review_notes END,
                updated_at = $5
            FROM prior
            WHERE v.entry_id = prior.entry_id AND prior.status::text = ANY($7)
            RETURNING prior.status AS prior_status, {}
            "#,
            VERIFICATION_COLUMNS
                .split(',')
                .map(|c| format!("v.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(transition.entry_id)
        .bind(transition.action.target())
        .bind(disposition)
        .bind(transition.actor_id)
        .bind(transition.at)
        .bind(&transition.notes)
        .bind(status_names(transition.action.expected()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Transitioned { prior_status, row }) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        insert_audit(
            &mut tx,
            NewAuditEvent::review_transition(transition, prior_status),
        )
        .await?;
        tx.commit().await?;

        Ok(Some(row.into()))
    }

    async fn list_overdue_verifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<VerificationRecord>> {
        let rows = sqlx::query_as::<_, VerificationRow>(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS}
            FROM verification_records
            WHERE status = $1 AND auto_miss_deadline <= $2
            ORDER BY auto_miss_deadline ASC, entry_id ASC
            LIMIT $3
            "#
        ))
        .bind(ReviewStatus::Initiated)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VerificationRecord::from).collect())
    }

    async fn list_audit_events(
        &self,
        entity_type: AuditEntity,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEvent>> {
        let events = sqlx::query_as::<_, AuditEvent>(
            r#"
            SELECT event_id, entity_type, entity_id, action, prior_value, new_value,
                   actor_id, occurred_at
            FROM audit_events
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY occurred_at ASC, recorded_seq ASC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
