//! Status HTTP server (§6, ambient observability surface): a tiny axum
//! router exposing liveness/readiness, grounded on the teacher's
//! `services/server`'s `build_router`/`axum::serve` wiring.
//!
//! - `GET /healthz` — always 200 once the process is up.
//! - `GET /readyz`  — 200 once the initial reconciler sync has completed and
//!   every configured subscription is open, 503 otherwise.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::info;

#[derive(Clone, Default)]
pub struct ReadinessState {
    ready: Arc<AtomicBool>,
}

impl ReadinessState {
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

pub fn build_router(state: ReadinessState) -> Router {
    Router::new().route("/healthz", get(healthz)).route("/readyz", get(readyz)).with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<ReadinessState>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn serve(bind: &str, state: ReadinessState, shutdown: impl std::future::Future<Output = ()> + Send + 'static) {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await.expect("failed to bind status HTTP listener");
    let addr: SocketAddr = listener.local_addr().expect("listener has a local address");
    info!(%addr, "status HTTP server listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await.expect("status HTTP server error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let state = ReadinessState::default();
        let router = build_router(state);
        let response = axum_test_request(&router, "/healthz").await;
        assert_eq!(response, 200);
    }

    #[tokio::test]
    async fn readyz_reflects_state() {
        let state = ReadinessState::default();
        let router = build_router(state.clone());
        assert_eq!(axum_test_request(&router, "/readyz").await, 503);
        state.mark_ready();
        assert_eq!(axum_test_request(&router, "/readyz").await, 200);
    }

    async fn axum_test_request(router: &Router, path: &str) -> u16 {
        use tower::ServiceExt;
        let request = axum::http::Request::builder().uri(path).body(axum::body::Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        response.status().as_u16()
    }
}
