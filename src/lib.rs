//! Medical named entity recognition over HTTP.
//!
//! The `med7-ner` binary serves [`api::router`] around a single
//! [`EntityRecognizer`]; the `med7-install-model` binary drives
//! [`installer::Installer`] to put a model where the service can load it.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod installer;
pub mod ner;

pub use error::NerError;
pub use ner::{Entity, EntityLabel, EntityRecognizer, Span};

/// Default upper bound on the number of texts in one batch request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// Default upper bound on a request body, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared router state. The model handle is built once in `main` and is
/// read-only afterwards, so it is shared without a lock.
#[derive(Clone)]
pub struct AppState {
    pub model: Option<Arc<dyn EntityRecognizer>>,
    pub max_batch_size: usize,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(model: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            model: Some(model),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// State for a service that failed to load its model and runs degraded.
    pub fn without_model() -> Self {
        Self {
            model: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::without_model()
    }
}
