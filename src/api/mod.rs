//! HTTP surface of the inference service.

use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use http::Request;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::AppState;

pub mod error;
pub mod extract;
pub mod health;

pub use error::ApiError;
pub use extract::{BatchItem, BatchResponse, NerResponse, TextInput, extract, extract_batch};
pub use health::{DocsResponse, HealthResponse, ServiceInfo, docs, health_check, root};

/// Build the router. Every request gets a span with a fresh id, and bodies
/// are capped at `state.max_body_bytes`.
pub fn router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/", get(root))
        .route("/docs", get(docs))
        .route("/health", get(health_check))
        .route("/extract", post(extract))
        .route("/extract/batch", post(extract_batch))
        .layer(body_limit)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                id = %Uuid::new_v4(),
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .with_state(state)
}
