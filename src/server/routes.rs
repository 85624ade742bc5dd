//! Router configuration for the control API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(handlers::start_session))
        .route("/api/sessions/:session_id", get(handlers::session_status))
        .route(
            "/api/sessions/:session_id/confirm-ready",
            post(handlers::confirm_ready),
        )
        .route(
            "/api/sessions/:session_id/scrape",
            post(handlers::scrape_session),
        )
        .route("/api/sessions/:session_id/stop", post(handlers::stop_session))
        // Job inspection and export
        .route("/api/jobs/:job_id", get(handlers::job_status))
        .route("/api/jobs/:job_id/records", get(handlers::job_records))
        .route("/api/jobs/:job_id/export", get(handlers::export_job_csv))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
