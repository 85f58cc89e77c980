use std::sync::Arc;

use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use med7_ner::api::{self, BatchItem, BatchResponse, HealthResponse, NerResponse, ServiceInfo};
use med7_ner::ner::LexiconRecognizer;
use med7_ner::{AppState, EntityLabel, EntityRecognizer, NerError, Span};
use serde_json::Value;
use tower::ServiceExt;

/// Fails on any text containing "fail" and panics on "panic".
struct Flaky;

impl EntityRecognizer for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn recognize(&self, text: &str) -> Result<Vec<Span>, NerError> {
        if text.contains("panic") {
            panic!("tokenizer exploded");
        }
        if text.contains("fail") {
            return Err(NerError::Inference("model rejected input".to_string()));
        }
        Ok(vec![Span::new(EntityLabel::Drug, 0, text.len().min(3))])
    }
}

fn lexicon_app() -> Router {
    let model: Arc<dyn EntityRecognizer> = Arc::new(LexiconRecognizer::new().unwrap());
    api::router(AppState::new(model))
}

fn flaky_app() -> Router {
    api::router(AppState::new(Arc::new(Flaky)))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    post_raw(app, uri, serde_json::to_vec(&body).unwrap()).await
}

async fn post_raw(app: Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_root_metadata() {
    let (status, body) = get(lexicon_app(), "/").await;
    let info: ServiceInfo = serde_json::from_value(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(info.message, "MED7 NER API");
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(info.docs, "/docs");
}

#[tokio::test]
async fn test_docs_lists_every_route() {
    let (status, body) = get(lexicon_app(), "/docs").await;

    assert_eq!(status, StatusCode::OK);
    let paths: Vec<&str> = body["endpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["/", "/docs", "/health", "/extract", "/extract/batch"]);
}

#[tokio::test]
async fn test_health_reports_model_presence() {
    let (status, body) = get(lexicon_app(), "/health").await;
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "healthy");
    assert!(health.model_loaded);

    let (status, body) = get(api::router(AppState::without_model()), "/health").await;
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(!health.model_loaded);
}

#[tokio::test]
async fn test_extract_prescription() {
    let text = "Patient takes 50mg aspirin daily";
    let (status, body) = post_json(lexicon_app(), "/extract", serde_json::json!({ "text": text })).await;
    assert_eq!(status, StatusCode::OK);

    let resp: NerResponse = serde_json::from_value(body).unwrap();
    assert_eq!(resp.text, text);
    assert_eq!(resp.entity_count, resp.entities.len());

    let found: Vec<(&str, EntityLabel, usize, usize)> = resp
        .entities
        .iter()
        .map(|e| (e.text.as_str(), e.label, e.start, e.end))
        .collect();
    assert_eq!(
        found,
        vec![
            ("50mg", EntityLabel::Dosage, 14, 18),
            ("aspirin", EntityLabel::Drug, 19, 26),
            ("daily", EntityLabel::Frequency, 27, 32),
        ]
    );
    for entity in &resp.entities {
        let covered: String = text.chars().skip(entity.start).take(entity.end - entity.start).collect();
        assert_eq!(covered, entity.text);
    }
}

#[tokio::test]
async fn test_extract_is_idempotent() {
    let body = serde_json::json!({ "text": "Ibuprofen 400 mg orally every 6 hours for 5 days" });
    let (_, first) = post_json(lexicon_app(), "/extract", body.clone()).await;
    let (_, second) = post_json(lexicon_app(), "/extract", body).await;

    assert_eq!(first, second);
    assert_eq!(first["entity_count"], 5);
}

#[tokio::test]
async fn test_extract_offsets_count_characters() {
    let text = "Café patient: aspirin";
    let (status, body) = post_json(lexicon_app(), "/extract", serde_json::json!({ "text": text })).await;
    assert_eq!(status, StatusCode::OK);

    let resp: NerResponse = serde_json::from_value(body).unwrap();
    assert_eq!(resp.entities[0].text, "aspirin");
    assert_eq!(resp.entities[0].start, 14);
    assert_eq!(resp.entities[0].end, 21);
}

#[tokio::test]
async fn test_extract_rejects_blank_text() {
    for text in ["", "   ", "\n\t", "\u{1c}\u{1f}", " \u{1d}\u{1e} "] {
        let (status, body) = post_json(lexicon_app(), "/extract", serde_json::json!({ "text": text })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Text cannot be empty");
        assert!(body.get("entities").is_none());
    }
}

#[tokio::test]
async fn test_missing_model_is_503_regardless_of_input() {
    let app = api::router(AppState::without_model());

    let (status, body) = post_json(app.clone(), "/extract", serde_json::json!({ "text": "aspirin" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Model not loaded");

    let (status, _) = post_json(app.clone(), "/extract", serde_json::json!({ "text": "" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post_raw(app.clone(), "/extract", b"not json".to_vec()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post_json(app.clone(), "/extract/batch", serde_json::json!(["aspirin"])).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post_json(app, "/extract/batch", serde_json::json!([])).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_extract_processing_error_is_500() {
    let (status, body) = post_json(flaky_app(), "/extract", serde_json::json!({ "text": "please fail" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Error processing text:"));
    assert!(detail.contains("model rejected input"));
}

#[tokio::test]
async fn test_extract_panic_is_500() {
    let (status, body) = post_json(flaky_app(), "/extract", serde_json::json!({ "text": "panic now" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("tokenizer exploded"));
}

#[tokio::test]
async fn test_malformed_body_is_422() {
    let (status, body) = post_raw(lexicon_app(), "/extract", b"{\"txt\": 1}".to_vec()).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_large_text_within_default_body_limit() {
    // Well past axum's built-in 2 MB default.
    let mut text = "Patient rested well overnight. ".repeat(80_000);
    text.push_str("Started aspirin");
    assert!(text.len() > 2_400_000);

    let (status, body) = post_json(lexicon_app(), "/extract", serde_json::json!({ "text": text })).await;
    assert_eq!(status, StatusCode::OK);

    let resp: NerResponse = serde_json::from_value(body).unwrap();
    assert_eq!(resp.entity_count, 1);
    assert_eq!(resp.entities[0].text, "aspirin");
    assert_eq!(resp.entities[0].end, text.chars().count());
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let model: Arc<dyn EntityRecognizer> = Arc::new(Flaky);
    let app = api::router(AppState::new(model).with_max_body_bytes(64));
    let text = "a".repeat(100);

    let (status, body) = post_json(app.clone(), "/extract", serde_json::json!({ "text": text })).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["detail"], "Request body exceeds the limit of 64 bytes");

    let (status, _) = post_json(app.clone(), "/extract/batch", serde_json::json!([text])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, _) = post_json(app, "/extract", serde_json::json!({ "text": "aspirin" })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_batch_rejects_empty_list() {
    let (status, body) = post_json(lexicon_app(), "/extract/batch", serde_json::json!([])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Texts list cannot be empty");
}

#[tokio::test]
async fn test_batch_processes_empty_item() {
    let (status, body) = post_json(lexicon_app(), "/extract/batch", serde_json::json!(["", "aspirin 50mg"])).await;
    assert_eq!(status, StatusCode::OK);

    let resp: BatchResponse = serde_json::from_value(body).unwrap();
    assert_eq!(resp.results.len(), 2);
    match &resp.results[0] {
        BatchItem::Extracted(r) => {
            assert_eq!(r.text, "");
            assert_eq!(r.entity_count, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &resp.results[1] {
        BatchItem::Extracted(r) => {
            assert_eq!(r.entity_count, 2);
            assert_eq!(r.entities[0].label, EntityLabel::Drug);
            assert_eq!(r.entities[1].label, EntityLabel::Dosage);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let texts = serde_json::json!(["aspirin", "please fail", "panic here", "warfarin"]);
    let (status, body) = post_json(flaky_app(), "/extract/batch", texts).await;
    assert_eq!(status, StatusCode::OK);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);

    assert_eq!(results[0]["text"], "aspirin");
    assert_eq!(results[0]["entity_count"], 1);
    assert!(results[0].get("error").is_none());

    assert_eq!(results[1]["text"], "please fail");
    assert!(results[1]["error"].as_str().unwrap().contains("model rejected input"));
    assert_eq!(results[1]["entities"], serde_json::json!([]));
    assert_eq!(results[1]["entity_count"], 0);

    assert!(results[2]["error"].as_str().unwrap().contains("tokenizer exploded"));
    assert_eq!(results[2]["entity_count"], 0);

    assert_eq!(results[3]["text"], "warfarin");
    assert_eq!(results[3]["entity_count"], 1);
}

#[tokio::test]
async fn test_batch_size_limit() {
    let model: Arc<dyn EntityRecognizer> = Arc::new(Flaky);
    let app = api::router(AppState::new(model).with_max_batch_size(2));

    let (status, body) = post_json(app.clone(), "/extract/batch", serde_json::json!(["a", "b", "c"])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["detail"], "Batch of 3 texts exceeds the maximum of 2");

    let (status, _) = post_json(app, "/extract/batch", serde_json::json!(["a", "b"])).await;
    assert_eq!(status, StatusCode::OK);
}
