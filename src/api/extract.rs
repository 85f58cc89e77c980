use std::any::Any;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::{debug, error};

use super::error::ApiError;
use crate::error::NerError;
use crate::ner::{Entity, EntityRecognizer, to_entities};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct TextInput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NerResponse {
    pub text: String,
    pub entities: Vec<Entity>,
    pub entity_count: usize,
}

impl NerResponse {
    pub fn new(text: String, entities: Vec<Entity>) -> Self {
        Self {
            entity_count: entities.len(),
            text,
            entities,
        }
    }
}

/// One entry of a batch response. A failed item keeps the response shape
/// with no entities and carries the failure message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Failed {
        text: String,
        error: String,
        entities: Vec<Entity>,
        entity_count: usize,
    },
    Extracted(NerResponse),
}

impl BatchItem {
    pub fn failed(text: String, error: String) -> Self {
        BatchItem::Failed {
            text,
            error,
            entities: Vec::new(),
            entity_count: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
}

/// POST /extract
pub async fn extract(
    State(state): State<AppState>,
    payload: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<NerResponse>, ApiError> {
    let model = state.model.clone().ok_or(ApiError::ModelUnavailable)?;
    let Json(input) = payload.map_err(|e| ApiError::from_rejection(e, state.max_body_bytes))?;

    if is_blank(&input.text) {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }

    let response = recognize(model, input.text).await.map_err(|e| {
        error!("Error processing text: {}", e);
        ApiError::Processing(e)
    })?;

    Ok(Json(response))
}

/// POST /extract/batch. Items are processed in order and independently;
/// only list-level problems fail the request.
pub async fn extract_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let model = state.model.clone().ok_or(ApiError::ModelUnavailable)?;
    let Json(texts) = payload.map_err(|e| ApiError::from_rejection(e, state.max_body_bytes))?;

    if texts.is_empty() {
        return Err(ApiError::InvalidInput("Texts list cannot be empty".to_string()));
    }
    if texts.len() > state.max_batch_size {
        return Err(ApiError::BatchTooLarge {
            size: texts.len(),
            max: state.max_batch_size,
        });
    }

    let mut results = Vec::with_capacity(texts.len());
    let mut failed = 0usize;
    for text in texts {
        match recognize(Arc::clone(&model), text.clone()).await {
            Ok(response) => results.push(BatchItem::Extracted(response)),
            Err(e) => {
                error!("Error processing text in batch: {}", e);
                failed += 1;
                results.push(BatchItem::failed(text, e));
            }
        }
    }
    debug!("Batch of {} processed, {} failed", results.len(), failed);

    Ok(Json(BatchResponse { results }))
}

/// Run the recognizer off the async workers. A panic inside the model is
/// reported as an error for this text only.
async fn recognize(model: Arc<dyn EntityRecognizer>, text: String) -> Result<NerResponse, String> {
    let task = tokio::task::spawn_blocking(move || {
        let spans = model.recognize(&text)?;
        let entities = to_entities(&text, &spans)?;
        Ok::<_, NerError>(NerResponse::new(text, entities))
    });

    match task.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(join_error_message(e)),
    }
}

/// Whitespace-only, counting the ASCII file/group/record/unit separators
/// (U+001C..U+001F) as whitespace too.
fn is_blank(text: &str) -> bool {
    text.trim_matches(|c: char| c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c))
        .is_empty()
}

fn join_error_message(e: JoinError) -> String {
    if !e.is_panic() {
        return "inference task was cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = e.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("model panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("model panicked: {}", msg)
    } else {
        "model panicked".to_string()
    }
}
