use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{Evidence, ReviewAction, VerificationRecord};

/// Evidence uploaded by the capture UI after a win claim.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AttachEvidenceRequest {
    /// Participant or staff member who supplied the evidence, if known.
    pub submitted_by: Option<Uuid>,

    #[serde(flatten)]
    #[validate(custom(function = "validate_evidence"))]
    pub evidence: Evidence,
}

/// Body of the staff review actions.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReviewActionRequest {
    pub reviewer_id: Uuid,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

/// Verification record plus the actions the staff console may offer for it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerificationResponse {
    #[serde(flatten)]
    pub record: VerificationRecord,
    pub allowed_actions: Vec<ReviewAction>,
}

impl From<VerificationRecord> for VerificationResponse {
    fn from(record: VerificationRecord) -> Self {
        let allowed_actions = record.status.allowed_actions();
        Self {
            record,
            allowed_actions,
        }
    }
}

fn validate_evidence(evidence: &Evidence) -> Result<(), ValidationError> {
    if evidence.is_empty() {
        let mut err = ValidationError::new("empty_evidence");
        err.message = Some("At least one evidence field must be provided".into());
        return Err(err);
    }
    if evidence.witnesses.iter().any(|w| w.name.trim().is_empty()) {
        let mut err = ValidationError::new("invalid_witness");
        err.message = Some("Witness name must not be empty".into());
        return Err(err);
    }
    if evidence.documents.iter().any(|d| d.uri.trim().is_empty()) {
        let mut err = ValidationError::new("invalid_document");
        err.message = Some("Document uri must not be empty".into());
        return Err(err);
    }
    if let (Some(started), Some(finished)) =
        (evidence.attempt_started_at, evidence.attempt_finished_at)
    {
        if finished < started {
            let mut err = ValidationError::new("invalid_capture_window");
            err.message = Some("Attempt cannot finish before it starts".into());
            return Err(err);
        }
    }
    Ok(())
}
