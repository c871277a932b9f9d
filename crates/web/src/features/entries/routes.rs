use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::handlers::{create_entry, get_entry, report_outcome};
use crate::middleware::auth::{ApiKeys, require_auth};
use crate::state::AppState;

pub fn routes(api_keys: ApiKeys) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_entry))
        .route("/:id/outcome", post(report_outcome))
        .route_layer(middleware::from_fn_with_state(api_keys, require_auth));

    Router::new()
        .route("/:id", get(get_entry))
        .merge(protected)
}
