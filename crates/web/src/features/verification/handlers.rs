use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use storage::{
    dto::verification::{AttachEvidenceRequest, ReviewActionRequest, VerificationResponse},
    services::{review, verification},
};
use uuid::Uuid;
use validator::Validate;

use crate::error::WebError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/entries/{id}/verification",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    responses(
        (status = 200, description = "Verification record, evidence and the actions still allowed", body = VerificationResponse),
        (status = 404, description = "No verification record for this entry")
    ),
    tag = "verification"
)]
pub async fn get_verification(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<VerificationResponse>, WebError> {
    let record = verification::get(state.store.as_ref(), entry_id).await?;

    Ok(Json(VerificationResponse::from(record)))
}

#[utoipa::path(
    post,
    path = "/api/entries/{id}/verification/evidence",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    request_body = AttachEvidenceRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Evidence merged into the record", body = VerificationResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No verification record for this entry"),
        (status = 409, description = "Review already closed")
    ),
    tag = "verification"
)]
pub async fn attach_evidence(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<AttachEvidenceRequest>,
) -> Result<Json<VerificationResponse>, WebError> {
    req.validate()?;

    let record = verification::attach_evidence(
        state.store.as_ref(),
        entry_id,
        &req.evidence,
        req.submitted_by,
        Utc::now(),
    )
    .await?;

    Ok(Json(VerificationResponse::from(record)))
}

#[utoipa::path(
    post,
    path = "/api/entries/{id}/verification/under-review",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    request_body = ReviewActionRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Claim is under review", body = VerificationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No verification record for this entry"),
        (status = 409, description = "Claim already decided")
    ),
    tag = "verification"
)]
pub async fn move_to_under_review(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<ReviewActionRequest>,
) -> Result<Json<VerificationResponse>, WebError> {
    req.validate()?;

    let record = review::move_to_under_review(
        state.store.as_ref(),
        state.notifier.as_ref(),
        entry_id,
        req.reviewer_id,
        Utc::now(),
    )
    .await?;

    Ok(Json(VerificationResponse::from(record)))
}

#[utoipa::path(
    post,
    path = "/api/entries/{id}/verification/approve",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    request_body = ReviewActionRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Win verified", body = VerificationResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No verification record for this entry"),
        (status = 409, description = "Claim already decided")
    ),
    tag = "verification"
)]
pub async fn approve(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<ReviewActionRequest>,
) -> Result<Json<VerificationResponse>, WebError> {
    req.validate()?;

    let record = review::approve(
        state.store.as_ref(),
        state.notifier.as_ref(),
        entry_id,
        req.reviewer_id,
        req.notes,
        Utc::now(),
    )
    .await?;

    Ok(Json(VerificationResponse::from(record)))
}

#[utoipa::path(
    post,
    path = "/api/entries/{id}/verification/reject",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    request_body = ReviewActionRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Win rejected", body = VerificationResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No verification record for this entry"),
        (status = 409, description = "Claim already decided")
    ),
    tag = "verification"
)]
pub async fn reject(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<ReviewActionRequest>,
) -> Result<Json<VerificationResponse>, WebError> {
    req.validate()?;

    let record = review::reject(
        state.store.as_ref(),
        state.notifier.as_ref(),
        entry_id,
        req.reviewer_id,
        req.notes,
        Utc::now(),
    )
    .await?;

    Ok(Json(VerificationResponse::from(record)))
}
