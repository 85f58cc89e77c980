use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Request failures, each mapped to one status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Batch of {size} texts exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Request body exceeds the limit of {max} bytes")]
    BodyTooLarge { max: usize },

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Error processing text: {0}")]
    Processing(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::BatchTooLarge { .. } | ApiError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl ApiError {
    /// Map a JSON extractor rejection. A body cut off by the size limit is a
    /// 413; anything else about the body is a 422.
    pub fn from_rejection(rejection: JsonRejection, max_body_bytes: usize) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::BodyTooLarge { max: max_body_bytes }
        } else {
            ApiError::InvalidBody(rejection.body_text())
        }
    }
}
