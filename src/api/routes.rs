use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::require_basic_auth;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Management routes (basic auth)
    let management_routes = Router::new()
        .route("/token", get(handlers::get_token))
        .route("/cache", post(handlers::set_cache))
        .route("/purge", delete(handlers::purge_cache))
        .route("/refresh", get(handlers::refresh_token))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_basic_auth,
        ));

    // Public routes
    let public_routes = Router::new()
        .route("/playing", get(handlers::playing))
        .route("/_internal/health", get(handlers::health));

    Router::new()
        .merge(management_routes)
        .merge(public_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
