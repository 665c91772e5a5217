pub mod content_validation;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    handlers::health::{health_handler, ping_handler},
};

/// Create the API router with every mounted area
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest(
        content_validation::BASE,
        content_validation::create_content_validation_router(),
    )
}

/// Full application: health probes, the API and request tracing.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(create_api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
