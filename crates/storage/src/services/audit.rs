use uuid::Uuid;

use crate::dto::audit::AuditTrailResponse;
use crate::error::LifecycleResult;
use crate::models::AuditEntity;
use crate::repository::LifecycleStore;

/// Full history of one entry or verification record, oldest first. An entity
/// with no events yields an empty trail rather than an error.
pub async fn list_for(
    store: &dyn LifecycleStore,
    entity_type: AuditEntity,
    entity_id: Uuid,
) -> LifecycleResult<AuditTrailResponse> {
    let events = store.list_audit_events(entity_type, entity_id).await?;

    Ok(AuditTrailResponse {
        entity_type,
        entity_id,
        events,
    })
}
