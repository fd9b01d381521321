//! # vstash-server
//!
//! HTTP transport for the vstash file store:
//! - `GET /health`
//! - token-addressed file access at `/{token}` and `/{token}/{*path}`
//! - token administration at `/admin/tokens` (admin key required)

use std::future::Future;

use anyhow::Result;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::field::display;
use vstash_config::log_http_info;

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::{ServerConfig, ServerState};

use routes::files;

/// Build the application router
pub fn create_app(state: ServerState) -> Router {
    let timeout = state.config.request_timeout();

    Router::new()
        .route("/health", get(health_check))
        .nest("/admin", routes::admin::create_router(state.clone()))
        .route("/:token", get(files::list_root).delete(files::delete_root))
        .route(
            "/:token/*path",
            get(files::get_path)
                .put(files::put_file)
                .delete(files::delete_path),
        )
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "vstash",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ServerState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state);
    log_http_info!("Listening", addr = display(listener.local_addr()?));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
