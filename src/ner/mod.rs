//! Entity recognizers and the MED7 label set.
//!
//! A recognizer turns text into [`Span`]s with byte offsets; the HTTP layer
//! turns those into [`Entity`] values with character offsets.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Backend;
use crate::error::{NerError, Result};

pub mod bert;
pub mod bio;
pub mod lexicon;

pub use bert::{BertConfig, BertRecognizer, locate_model_dir};
pub use lexicon::LexiconRecognizer;

/// Entity categories emitted by MED7-style models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLabel {
    Dosage,
    Drug,
    Duration,
    Form,
    Frequency,
    Route,
    Strength,
}

impl EntityLabel {
    pub const ALL: [EntityLabel; 7] = [
        EntityLabel::Dosage,
        EntityLabel::Drug,
        EntityLabel::Duration,
        EntityLabel::Form,
        EntityLabel::Frequency,
        EntityLabel::Route,
        EntityLabel::Strength,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Dosage => "DOSAGE",
            EntityLabel::Drug => "DRUG",
            EntityLabel::Duration => "DURATION",
            EntityLabel::Form => "FORM",
            EntityLabel::Frequency => "FREQUENCY",
            EntityLabel::Route => "ROUTE",
            EntityLabel::Strength => "STRENGTH",
        }
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityLabel {
    type Err = NerError;

    fn from_str(s: &str) -> Result<Self> {
        EntityLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| NerError::InvalidInput(format!("unknown entity label '{}'", s)))
    }
}

/// A recognized span. Offsets are byte offsets into the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub label: EntityLabel,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(label: EntityLabel, start: usize, end: usize) -> Self {
        Self { label, start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An entity as returned to clients. Offsets count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: EntityLabel,
    pub start: usize,
    pub end: usize,
}

/// Convert recognizer spans into client entities, preserving order.
pub fn to_entities(text: &str, spans: &[Span]) -> Result<Vec<Entity>> {
    // Byte and char position of the previous span start, so spans in
    // document order are counted in a single pass over the text.
    let mut cursor = (0usize, 0usize);
    spans
        .iter()
        .map(|span| {
            let covered = text.get(span.start..span.end).ok_or_else(|| {
                NerError::Inference(format!(
                    "span {}..{} does not fall on character boundaries of the input",
                    span.start, span.end
                ))
            })?;
            if span.start < cursor.0 {
                cursor = (0, 0);
            }
            let start = cursor.1 + text[cursor.0..span.start].chars().count();
            cursor = (span.start, start);
            Ok(Entity {
                text: covered.to_string(),
                label: span.label,
                start,
                end: start + covered.chars().count(),
            })
        })
        .collect()
}

/// The model capability the service depends on: given text, return the
/// labelled spans in document order. Implementations must be safe to call
/// from several threads at once.
pub trait EntityRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, text: &str) -> Result<Vec<Span>>;
}

/// Build the recognizer selected by `backend`.
pub fn load(backend: Backend, model_dir: &Path, config: BertConfig) -> Result<Arc<dyn EntityRecognizer>> {
    match backend {
        Backend::Bert => {
            let dir = locate_model_dir(model_dir).ok_or_else(|| {
                NerError::ModelLoad(format!(
                    "no token-classification model (config.json, tokenizer.json, model.safetensors) under {}",
                    model_dir.display()
                ))
            })?;
            info!("Loading BERT token classifier from {}", dir.display());
            Ok(Arc::new(BertRecognizer::load(&dir, config)?))
        }
        Backend::Lexicon => {
            info!("Loading lexicon recognizer");
            Ok(Arc::new(LexiconRecognizer::new()?))
        }
    }
}
