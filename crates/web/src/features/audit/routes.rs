use axum::{Router, routing::get};

use super::handlers::get_audit_trail;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/:entity_type/:entity_id", get(get_audit_trail))
}
