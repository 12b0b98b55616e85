use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::handlers;
use super::ApiState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    Router::new()
        .route("/api/uploads/check", post(handlers::check_upload))
        .route("/api/uploads/record", post(handlers::record_upload))
        .route("/api/uploads/:identity", get(handlers::get_upload_count))
        .route("/api/uploads/:identity/history", get(handlers::get_upload_history))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
