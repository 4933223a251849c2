use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use super::{downloads, handlers, middleware::metrics_middleware, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let download_dir = state.config().downloads.dir.clone();

    // API routes
    let api_routes = Router::new()
        // Health, config and engine status
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Download jobs
        .route(
            "/downloads",
            post(downloads::start_download).get(downloads::list_downloads),
        )
        .route(
            "/downloads/{id}",
            get(downloads::get_download).delete(downloads::cancel_download),
        )
        .route("/history", get(downloads::list_history))
        // Live job events
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::get_metrics))
        .nest_service("/files", ServeDir::new(download_dir))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
