//! Top-level router assembly. Public routes sit outside the authentication
//! middleware; everything under /api requires a verified bearer token.

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::core::middleware::authentication_middleware;
use crate::core::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn configure_api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::categories::configure_categories_routes())
        .merge(crate::attachments::configure_attachments_routes())
        .layer(from_fn_with_state(state, authentication_middleware));

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/public/categories",
            get(crate::categories::list_public_categories),
        )
        .nest("/api", protected)
}
