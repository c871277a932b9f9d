use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::handlers::{approve, attach_evidence, get_verification, move_to_under_review, reject};
use crate::middleware::auth::{ApiKeys, require_auth};
use crate::state::AppState;

/// Mounted under `/api/entries`.
pub fn routes(api_keys: ApiKeys) -> Router<AppState> {
    let protected = Router::new()
        .route("/:id/verification/evidence", post(attach_evidence))
        .route("/:id/verification/under-review", post(move_to_under_review))
        .route("/:id/verification/approve", post(approve))
        .route("/:id/verification/reject", post(reject))
        .route_layer(middleware::from_fn_with_state(api_keys, require_auth));

    Router::new()
        .route("/:id/verification", get(get_verification))
        .merge(protected)
}
