//! Report HTTP Server
//!
//! Serves the report snapshot as JSON on `GET {path_prefix}` for the
//! external renderer.

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::refresh::ReportSource;

/// Build the router; an empty prefix serves the root
pub fn router(source: ReportSource, path_prefix: &str) -> Router {
    let route = if path_prefix.is_empty() {
        "/".to_string()
    } else if path_prefix.starts_with('/') {
        path_prefix.to_string()
    } else {
        format!("/{}", path_prefix)
    };

    Router::new()
        .route(&route, get(report_handler))
        .route("/healthz", get(liveness))
        .with_state(source)
        .layer(TraceLayer::new_for_http())
}

async fn report_handler(State(source): State<ReportSource>) -> Response {
    match source.report().await {
        Ok(Some(report)) => Json(&*report).into_response(),
        Ok(None) => (StatusCode::SERVICE_UNAVAILABLE, "report not ready yet").into_response(),
        Err(e) => {
            warn!("Report request failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Serve until `shutdown` flips
pub async fn serve(
    addr: SocketAddr,
    source: ReportSource,
    path_prefix: &str,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let app = router(source, path_prefix);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Report server listening on http://{}{}", addr, path_prefix);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("Report server shut down gracefully");
    Ok(())
}
