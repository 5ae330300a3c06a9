use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    create_event, delete_event, get_event, health_check, list_events, update_event, version_info,
};
use crate::middleware::require_api_key;
use crate::state::AppState;

/// Event CRUD, all behind the API key check.
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route_layer(middleware::from_fn_with_state(state, require_api_key))
}

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version_info))
        .nest("/api", api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config))
        .layer(create_cors_layer(config))
        .with_state(state)
}
