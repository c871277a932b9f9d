use axum::{Router, middleware, routing::post};

use super::handlers::{run_auto_miss_sweep, run_verification_backlog};
use crate::middleware::auth::{ApiKeys, require_auth};
use crate::state::AppState;

pub fn routes(api_keys: ApiKeys) -> Router<AppState> {
    Router::new()
        .route("/auto-miss", post(run_auto_miss_sweep))
        .route("/verification-backlog", post(run_verification_backlog))
        .route_layer(middleware::from_fn_with_state(api_keys, require_auth))
}
