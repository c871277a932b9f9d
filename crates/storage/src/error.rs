use thiserror::Error;
use uuid::Uuid;

use crate::models::{EntryStatus, ReviewAction, ReviewStatus};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23505")
        )
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::Database(e))
                if e.code().as_deref() == Some("23503")
        )
    }
}

/// Errors surfaced by lifecycle operations.
///
/// A lost race is not represented here: the caller that loses a conditional
/// update gets an unchanged result, not an error.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("entry {0} not found")]
    EntryNotFound(Uuid),

    #[error("no verification record for entry {0}")]
    VerificationNotFound(Uuid),

    #[error("an outcome has already been reported for entry {entry_id}")]
    AlreadyReported { entry_id: Uuid, status: EntryStatus },

    #[error("the attempt window for entry {0} has closed")]
    WindowClosed(Uuid),

    #[error("participant {participant_id} does not own entry {entry_id}")]
    NotEntryParticipant { entry_id: Uuid, participant_id: Uuid },

    #[error("cannot {action} a verification record that is {from}")]
    InvalidTransition {
        entry_id: Uuid,
        from: ReviewStatus,
        action: ReviewAction,
    },

    #[error("evidence cannot be attached to a verification record that is {status}")]
    EvidenceClosed { entry_id: Uuid, status: ReviewStatus },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;
