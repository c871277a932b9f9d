use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use storage::error::{LifecycleError, StorageError};
use validator::ValidationErrors;

/// Web layer errors
#[derive(Debug)]
pub enum WebError {
    Lifecycle(LifecycleError),
    Validation(ValidationErrors),
    BadRequest(String),
    Unauthorized,
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifecycle(e) => write!(f, "Lifecycle error: {}", e),
            Self::Validation(e) => write!(f, "Validation error: {}", e),
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized"),
        }
    }
}

impl WebError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Lifecycle(e) => match e {
                LifecycleError::EntryNotFound(_) | LifecycleError::VerificationNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LifecycleError::Storage(StorageError::NotFound) => StatusCode::NOT_FOUND,
                LifecycleError::AlreadyReported { .. }
                | LifecycleError::WindowClosed(_)
                | LifecycleError::InvalidTransition { .. }
                | LifecycleError::EvidenceClosed { .. } => StatusCode::CONFLICT,
                LifecycleError::NotEntryParticipant { .. } => StatusCode::FORBIDDEN,
                LifecycleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                LifecycleError::Storage(StorageError::ConstraintViolation(_)) => {
                    StatusCode::CONFLICT
                }
                LifecycleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let body = match &self {
            Self::Lifecycle(LifecycleError::Storage(StorageError::NotFound)) => {
                json!({
                    "error": "Resource not found"
                })
            }
            Self::Lifecycle(LifecycleError::Storage(StorageError::ConstraintViolation(msg))) => {
                json!({
                    "error": msg
                })
            }
            Self::Lifecycle(LifecycleError::Storage(e)) => {
                tracing::error!("Storage error: {:?}", e);
                json!({
                    "error": "An internal error occurred"
                })
            }
            Self::Lifecycle(LifecycleError::WindowClosed(entry_id)) => {
                json!({
                    "error": "The attempt window has closed; this entry can no longer be reported.",
                    "entry_id": entry_id,
                })
            }
            Self::Lifecycle(LifecycleError::AlreadyReported { entry_id, status }) => {
                json!({
                    "error": "An outcome has already been reported for this entry.",
                    "entry_id": entry_id,
                    "status": status,
                })
            }
            Self::Lifecycle(LifecycleError::InvalidTransition {
                entry_id,
                from,
                action,
            }) => {
                json!({
                    "error": format!("Cannot {action} a claim that is {from}"),
                    "entry_id": entry_id,
                    "status": from,
                    "allowed_actions": from.allowed_actions(),
                })
            }
            Self::Lifecycle(e) => {
                json!({
                    "error": e.to_string()
                })
            }
            Self::Validation(errors) => {
                let field_errors: Vec<String> = errors
                    .field_errors()
                    .iter()
                    .flat_map(|(field, errors)| {
                        errors.iter().map(move |e| {
                            format!(
                                "{}: {}",
                                field,
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| e.code.to_string())
                            )
                        })
                    })
                    .collect();

                json!({
                    "error": "Validation failed",
                    "details": field_errors
                })
            }
            Self::BadRequest(msg) => {
                json!({
                    "error": msg
                })
            }
            Self::Unauthorized => {
                json!({
                    "error": "Unauthorized"
                })
            }
        };

        (status_code, Json(body)).into_response()
    }
}

impl From<LifecycleError> for WebError {
    fn from(error: LifecycleError) -> Self {
        Self::Lifecycle(error)
    }
}

impl From<StorageError> for WebError {
    fn from(error: StorageError) -> Self {
        Self::Lifecycle(error.into())
    }
}

impl From<ValidationErrors> for WebError {
    fn from(error: ValidationErrors) -> Self {
        Self::Validation(error)
    }
}
