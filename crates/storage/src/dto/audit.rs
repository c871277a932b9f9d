use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{AuditEntity, AuditEvent};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditTrailResponse {
    pub entity_type: AuditEntity,
    pub entity_id: Uuid,
    pub events: Vec<AuditEvent>,
}
