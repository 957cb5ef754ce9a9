use axum::extract::DefaultBodyLimit;
use axum::{Extension, Router};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod handlers;
mod health;

pub use config::Config;

use crate::ServiceState;

const API_PREFIX: &str = "/api";
const STATUS_PREFIX: &str = "/_status";

/// Largest request body accepted (4 MB); cell values are small records
pub const MAX_REQUEST_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// Build the full router: status routes, the cell API and the fallback
pub fn router(config: &Config, state: ServiceState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(config.log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .nest(API_PREFIX, api::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE_BYTES))
        .layer(Extension(config.clone()))
        .with_state(state)
        .layer(trace_layer)
}

/// Run the cell API server until `shutdown_rx` fires
pub async fn run_api(
    config: Config,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let listen_addr = config.listen_addr;
    let router = router(&config, state);

    tracing::info!(addr = ?listen_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use common::prelude::Entity;

    use super::*;
    use crate::cell_table::CellTable;

    fn test_router() -> Router {
        let state = ServiceState::new(
            CellTable::in_memory(),
            Entity::generate().unwrap().public(),
        );
        router(&Config::new(([127, 0, 0, 1], 0).into()), state)
    }

    async fn status_of(router: Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_routes() {
        let router = test_router();
        assert_eq!(status_of(router.clone(), "GET", "/_status/livez").await, StatusCode::OK);
        assert_eq!(
            status_of(router.clone(), "GET", "/api/v0/cells/root").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(router.clone(), "POST", "/api/v0/cells/root").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(router.clone(), "GET", "/api/v0/cells/root").await,
            StatusCode::OK
        );
        assert_eq!(status_of(router, "GET", "/elsewhere").await, StatusCode::NOT_FOUND);
    }
}
