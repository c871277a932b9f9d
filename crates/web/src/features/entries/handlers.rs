use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use storage::{
    dto::entry::{CreateEntryRequest, EntryResponse, EntryStatusResponse, ReportOutcomeRequest},
    services::{entries, outcome},
};
use uuid::Uuid;
use validator::Validate;

use crate::error::WebError;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/entries",
    request_body = CreateEntryRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "Entry created, or the entry already created for this payment reference", body = EntryResponse),
        (status = 400, description = "Validation error or payment reference bound to another entry"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "entries"
)]
pub async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<Response, WebError> {
    req.validate()?;

    let entry =
        entries::create_entry(state.store.as_ref(), &state.settings, &req, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(EntryResponse::from(entry))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/entries/{id}",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    responses(
        (status = 200, description = "Current status, outcome and time left in the attempt window", body = EntryStatusResponse),
        (status = 404, description = "Entry not found")
    ),
    tag = "entries"
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<EntryStatusResponse>, WebError> {
    let status = entries::get_entry_status(state.store.as_ref(), entry_id, Utc::now()).await?;

    Ok(Json(status))
}

#[utoipa::path(
    post,
    path = "/api/entries/{id}/outcome",
    params(
        ("id" = Uuid, Path, description = "Entry id")
    ),
    request_body = ReportOutcomeRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Outcome recorded", body = EntryStatusResponse),
        (status = 400, description = "Outcome is not win or miss"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Reporter does not own the entry"),
        (status = 404, description = "Entry not found"),
        (status = 409, description = "Outcome already reported or attempt window closed")
    ),
    tag = "entries"
)]
pub async fn report_outcome(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<ReportOutcomeRequest>,
) -> Result<Json<EntryStatusResponse>, WebError> {
    req.validate()?;

    let now = Utc::now();
    let entry = outcome::report_outcome(
        state.store.as_ref(),
        &state.settings,
        entry_id,
        req.outcome,
        req.participant_id,
        now,
    )
    .await?;

    Ok(Json(EntryStatusResponse::from_entry(&entry, now)))
}
