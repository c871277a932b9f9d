use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::settings::OverduePolicy;

/// Result of one pass over a batch of candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchSummary {
    /// Candidates selected for this pass.
    pub processed: usize,
    /// Candidates transitioned by this pass.
    pub applied: usize,
    /// Candidates another actor had already moved on; not an error.
    pub skipped: usize,
    pub errored: usize,
    /// Ids to retry on the next run.
    pub failed_ids: Vec<Uuid>,
}

impl BatchSummary {
    pub fn record_applied(&mut self) {
        self.processed += 1;
        self.applied += 1;
    }

    pub fn record_skipped(&mut self) {
        self.processed += 1;
        self.skipped += 1;
    }

    pub fn record_failed(&mut self, id: Uuid) {
        self.processed += 1;
        self.errored += 1;
        self.failed_ids.push(id);
    }
}

/// Returned to the scheduler trigger after one auto-miss run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepSummary {
    pub started_at: DateTime<Utc>,
    /// Candidates handled across both batches.
    pub processed: usize,
    /// Candidates that failed across both batches.
    pub errored: usize,
    /// Entries whose attempt window elapsed without a report.
    pub entries: BatchSummary,
    /// Win claims still `initiated` past their verification deadline.
    pub verifications: BatchSummary,
    pub overdue_policy: OverduePolicy,
}

impl SweepSummary {
    pub fn new(
        started_at: DateTime<Utc>,
        entries: BatchSummary,
        verifications: BatchSummary,
        overdue_policy: OverduePolicy,
    ) -> Self {
        Self {
            started_at,
            processed: entries.processed + verifications.processed,
            errored: entries.errored + verifications.errored,
            entries,
            verifications,
            overdue_policy,
        }
    }
}

/// Result of a reconciliation pass creating missing verification records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BacklogSummary {
    pub created: usize,
    pub already_present: usize,
    pub errored: usize,
    pub failed_ids: Vec<Uuid>,
}
