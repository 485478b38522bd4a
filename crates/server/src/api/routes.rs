use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{convert, handlers, middleware::metrics_middleware};
use crate::state::AppState;

/// Multipart framing allowance on top of the staged payloads.
const BODY_LIMIT_SLACK: u64 = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let storage = &state.config().storage;
    // per-file ceilings are enforced while staging; this caps the whole body
    let body_limit = storage
        .max_upload_bytes
        .saturating_mul(storage.max_files_per_job.max(1) as u64)
        .saturating_add(BODY_LIMIT_SLACK);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    let cors = if state.config().server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    // API routes
    let api_routes = Router::new()
        // Health and metadata
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/operations", get(handlers::list_operations))
        // Conversions
        .route(
            "/convert/{operation}",
            post(convert::convert).layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
