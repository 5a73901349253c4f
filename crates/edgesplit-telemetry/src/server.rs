//! HTTP surface for the status service: `GET /status` as `text/plain`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Result, TelemetryError};
use crate::status::StatusService;

pub const STATUS_PATH: &str = "/status";

pub fn build_router(service: Arc<StatusService>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(get_status))
        .with_state(service)
}

async fn get_status(State(service): State<Arc<StatusService>>) -> impl IntoResponse {
    // Segment reads are blocking mmap I/O.
    let live = Arc::clone(&service);
    let line = match tokio::task::spawn_blocking(move || live.get_status()).await {
        Ok(line) => line,
        Err(e) => {
            warn!(%e, "status task failed, serving cached values");
            service.cached_report().to_string()
        }
    };
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], line)
}

/// Bind `addr` and serve until `shutdown` flips to `true` or its sender is
/// dropped.
pub async fn serve(
    addr: SocketAddr,
    service: Arc<StatusService>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TelemetryError::Server(format!("bind {addr}: {e}")))?;
    serve_listener(listener, service, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(
    listener: TcpListener,
    service: Arc<StatusService>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!(addr = %local, path = STATUS_PATH, "status server listening");

    axum::serve(listener, build_router(service))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| TelemetryError::Server(e.to_string()))?;

    info!("status server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SharedSegment;
    use crate::status::{StatusReport, NORMALIZED_METRICS_FIELDS};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn service(dir: &std::path::Path) -> Arc<StatusService> {
        let metrics = SharedSegment::create(dir, 1991, 128).unwrap();
        let bandwidth = SharedSegment::create(dir, 6652, 10).unwrap();
        metrics.write(b"1,2,3,4,5,6,7\n").unwrap();
        bandwidth.write(b"0000000999").unwrap();
        Arc::new(StatusService::from_segments(metrics, bandwidth))
    }

    #[tokio::test]
    async fn status_route_returns_plain_text_line() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(service(dir.path()));

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report = StatusReport::parse(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(report.metrics.len(), NORMALIZED_METRICS_FIELDS);
        assert_eq!(report.bandwidth, 999);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(service(dir.path()));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let handle = tokio::spawn(serve(addr, service(dir.path()), rx));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn vanished_segments_still_answer_ok() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let app = build_router(Arc::clone(&svc));

        // Prime the caches with one good request.
        let first = app
            .clone()
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        std::fs::remove_file(crate::segment::segment_path(dir.path(), 1991)).unwrap();
        std::fs::remove_file(crate::segment::segment_path(dir.path(), 6652)).unwrap();

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report = StatusReport::parse(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(report.metrics[..7].join(","), "1,2,3,4,5,6,7");
        assert_eq!(report.bandwidth, 999);
    }
}
