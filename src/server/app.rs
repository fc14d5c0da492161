use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::api::api_routes;

use super::AppState;

/// Operational router: health, stats and metrics
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(api_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
