//! Route definitions and server startup.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::web::handlers;
use crate::web::state::AppState;

/// Builds the application router with all API routes and CORS.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/info", post(handlers::info))
        .route("/api/download", post(handlers::start_download))
        .route("/api/status/:task_id", get(handlers::status))
        .route("/download/:task_id", get(handlers::download_file))
        .route("/api/cancel/:task_id", get(handlers::cancel))
        .route("/api/history", get(handlers::history).delete(handlers::clear_history))
        .route("/api/queue", get(handlers::queue))
        .route("/api/events", get(handlers::events))
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Binds the listener and serves the API until shutdown.
pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = build_router(state);

    log::info!("Starting server on http://{}", addr);
    log::info!("  POST /api/info          - Inspect a media URL");
    log::info!("  POST /api/download      - Start a download task");
    log::info!("  GET  /api/status/:id    - Task status");
    log::info!("  GET  /api/queue         - Task queue snapshot");
    log::info!("  GET  /api/events        - Progress push channel (SSE)");
    log::info!("  GET  /download/:id      - Fetch a completed file");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
