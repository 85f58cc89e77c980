use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub docs: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointDoc {
    pub method: String,
    pub path: String,
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocsResponse {
    pub endpoints: Vec<EndpointDoc>,
}

pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/", "Service name, version and docs pointer"),
    ("GET", "/docs", "This endpoint listing"),
    ("GET", "/health", "Liveness and whether the model is loaded"),
    ("POST", "/extract", "Extract entities from {\"text\": string}"),
    ("POST", "/extract/batch", "Extract entities from each string of a JSON array"),
];

/// GET /
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "MED7 NER API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/docs".to_string(),
    })
}

/// GET /docs
pub async fn docs() -> Json<DocsResponse> {
    Json(DocsResponse {
        endpoints: ENDPOINTS
            .iter()
            .map(|(method, path, summary)| EndpointDoc {
                method: method.to_string(),
                path: path.to_string(),
                summary: summary.to_string(),
            })
            .collect(),
    })
}

/// GET /health. Reports model presence only; it never fails.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.model_loaded(),
    })
}
