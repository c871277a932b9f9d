use axum::{
    Json,
    extract::{Path, State},
};
use storage::{dto::audit::AuditTrailResponse, models::AuditEntity, services::audit};
use uuid::Uuid;

use crate::error::WebError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/audit/{entity_type}/{entity_id}",
    params(
        ("entity_type" = String, Path, description = "`entry` or `verification`"),
        ("entity_id" = Uuid, Path, description = "Entry id; verification records share their entry's id")
    ),
    responses(
        (status = 200, description = "Audit trail, oldest first", body = AuditTrailResponse),
        (status = 400, description = "Unknown entity type")
    ),
    tag = "audit"
)]
pub async fn get_audit_trail(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
) -> Result<Json<AuditTrailResponse>, WebError> {
    let entity_type: AuditEntity = entity_type.parse().map_err(WebError::BadRequest)?;

    let trail = audit::list_for(state.store.as_ref(), entity_type, entity_id).await?;

    Ok(Json(trail))
}
