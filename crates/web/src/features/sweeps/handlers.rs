use axum::{Json, extract::State};
use chrono::Utc;
use storage::{
    dto::sweep::{BacklogSummary, SweepSummary},
    services::{auto_miss, verification},
};

use crate::error::WebError;
use crate::state::AppState;

/// Entry point for an external scheduler. Takes no business arguments; safe to
/// call while the in-process scheduler or another worker is sweeping.
#[utoipa::path(
    post,
    path = "/api/sweeps/auto-miss",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Sweep finished; failed ids are retried on the next run", body = SweepSummary),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sweeps"
)]
pub async fn run_auto_miss_sweep(
    State(state): State<AppState>,
) -> Result<Json<SweepSummary>, WebError> {
    let summary = auto_miss::run_sweep(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &state.settings,
        Utc::now(),
    )
    .await?;

    Ok(Json(summary))
}

#[utoipa::path(
    post,
    path = "/api/sweeps/verification-backlog",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Missing verification records created", body = BacklogSummary),
        (status = 401, description = "Unauthorized")
    ),
    tag = "sweeps"
)]
pub async fn run_verification_backlog(
    State(state): State<AppState>,
) -> Result<Json<BacklogSummary>, WebError> {
    let summary =
        verification::ensure_backlog(state.store.as_ref(), &state.settings, Utc::now()).await?;

    Ok(Json(summary))
}
