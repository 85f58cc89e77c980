//! BERT token classifier loaded from a local Hugging Face export.

use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{D, DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config, HiddenAct, PositionEmbeddingType};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::bio::{self, Tag};
use super::{EntityRecognizer, Span};
use crate::error::{NerError, Result};

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

const SEARCH_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct BertConfig {
    /// Maximum sequence length the model accepts, special tokens included.
    pub max_length: usize,
    pub use_gpu: bool,
}

impl Default for BertConfig {
    fn default() -> Self {
        Self {
            max_length: 512,
            use_gpu: false,
        }
    }
}

/// Find the first directory under `root` (breadth first) holding a
/// complete token-classification export.
pub fn locate_model_dir(root: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .max_depth(SEARCH_DEPTH)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    // Stable sort: name order is kept within each depth.
    dirs.sort_by_key(|(depth, _)| *depth);
    dirs.into_iter()
        .map(|(_, dir)| dir)
        .find(|dir| is_model_dir(dir))
}

fn is_model_dir(dir: &Path) -> bool {
    [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE]
        .iter()
        .all(|file| dir.join(file).is_file())
}

pub struct BertRecognizer {
    model: BertModel,
    classifier: Linear,
    tokenizer: Tokenizer,
    tags: Vec<Tag>,
    cls_id: u32,
    sep_id: u32,
    /// Word pieces per forward pass, excluding `[CLS]` and `[SEP]`.
    window: usize,
    device: Device,
}

impl BertRecognizer {
    pub fn load(dir: &Path, config: BertConfig) -> Result<Self> {
        let start = Instant::now();

        let device = if config.use_gpu {
            Device::cuda_if_available(0).unwrap_or(Device::Cpu)
        } else {
            Device::Cpu
        };
        debug!("Using device: {:?}", device);

        let raw = std::fs::read_to_string(dir.join(CONFIG_FILE))?;
        let json: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| NerError::ModelLoad(format!("parse {}: {}", CONFIG_FILE, e)))?;
        let bert_config = bert_config_from_json(&json);
        let tags = tags_from_json(&json)?;

        let tokenizer = Tokenizer::from_file(dir.join(TOKENIZER_FILE))
            .map_err(|e| NerError::Tokenization(e.to_string()))?;

        let weights = dir.join(WEIGHTS_FILE);
        info!("Loading model weights from {:?}", weights);
        // SAFETY: the weights file is not modified while the model is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .map_err(|e| NerError::ModelLoad(e.to_string()))?
        };

        let model = BertModel::load(vb.clone(), &bert_config)
            .or_else(|_| BertModel::load(vb.pp("bert"), &bert_config))
            .map_err(|e| NerError::ModelLoad(format!("BertModel: {}", e)))?;

        let classifier = candle_nn::linear(bert_config.hidden_size, tags.len(), vb.pp("classifier"))
            .map_err(|e| NerError::ModelLoad(format!("classifier: {}", e)))?;

        let window = config
            .max_length
            .min(bert_config.max_position_embeddings)
            .saturating_sub(2)
            .max(1);

        info!(
            "BERT token classifier loaded in {:?} ({} labels, window {})",
            start.elapsed(),
            tags.len(),
            window
        );

        Self::from_parts(model, classifier, tokenizer, tags, window, device)
    }

    /// Assemble a recognizer from already-built parts. `window` counts word
    /// pieces per forward pass, excluding `[CLS]` and `[SEP]`.
    pub(crate) fn from_parts(
        model: BertModel,
        classifier: Linear,
        mut tokenizer: Tokenizer,
        tags: Vec<Tag>,
        window: usize,
        device: Device,
    ) -> Result<Self> {
        // Windowing is done here; the tokenizer must hand back every piece.
        tokenizer
            .with_truncation(None)
            .map_err(|e| NerError::Tokenization(e.to_string()))?;
        tokenizer.with_padding(None);

        let cls_id = special_token_id(&tokenizer, &["[CLS]", "<s>"])?;
        let sep_id = special_token_id(&tokenizer, &["[SEP]", "</s>"])?;

        Ok(Self {
            model,
            classifier,
            tokenizer,
            tags,
            cls_id,
            sep_id,
            window: window.max(1),
            device,
        })
    }

    /// One tag per word piece, windows stitched back together. Class indices
    /// the label table does not cover read as `O`.
    fn tag_pieces(&self, ids: &[u32]) -> Result<Vec<Tag>> {
        let mut tags = Vec::with_capacity(ids.len());
        for window in ids.chunks(self.window) {
            for class in self.classify(window)? {
                tags.push(self.tags.get(class as usize).copied().unwrap_or(Tag::Outside));
            }
        }
        Ok(tags)
    }

    /// Class index per word piece of one window.
    fn classify(&self, pieces: &[u32]) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(pieces.len() + 2);
        ids.push(self.cls_id);
        ids.extend_from_slice(pieces);
        ids.push(self.sep_id);

        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = input_ids.ones_like()?;

        // [1, seq, hidden] -> [seq, labels]
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let logits = self.classifier.forward(&hidden)?.squeeze(0)?;
        let classes = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;

        if classes.len() != ids.len() {
            return Err(NerError::Inference(format!(
                "expected {} predictions, got {}",
                ids.len(),
                classes.len()
            )));
        }
        Ok(classes[1..classes.len() - 1].to_vec())
    }
}

impl EntityRecognizer for BertRecognizer {
    fn name(&self) -> &str {
        "bert"
    }

    fn recognize(&self, text: &str) -> Result<Vec<Span>> {
        let start = Instant::now();

        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| NerError::Tokenization(e.to_string()))?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let tags = self.tag_pieces(ids)?;
        let spans = bio::decode(&tags, encoding.get_offsets(), encoding.get_word_ids());
        debug!(
            "Recognized {} spans over {} word pieces in {:?}",
            spans.len(),
            ids.len(),
            start.elapsed()
        );
        Ok(spans)
    }
}

fn special_token_id(tokenizer: &Tokenizer, candidates: &[&str]) -> Result<u32> {
    candidates
        .iter()
        .find_map(|token| tokenizer.token_to_id(token))
        .ok_or_else(|| NerError::Tokenization(format!("tokenizer has none of {:?}", candidates)))
}

fn bert_config_from_json(json: &serde_json::Value) -> Config {
    let usize_or = |key: &str, default: usize| json[key].as_u64().map(|v| v as usize).unwrap_or(default);
    let hidden_act = match json["hidden_act"].as_str() {
        Some("relu") => HiddenAct::Relu,
        Some("gelu_new") | Some("gelu_approximate") => HiddenAct::GeluApproximate,
        _ => HiddenAct::Gelu,
    };

    Config {
        vocab_size: usize_or("vocab_size", 30522),
        hidden_size: usize_or("hidden_size", 768),
        num_hidden_layers: usize_or("num_hidden_layers", 12),
        num_attention_heads: usize_or("num_attention_heads", 12),
        intermediate_size: usize_or("intermediate_size", 3072),
        hidden_act,
        hidden_dropout_prob: 0.1,
        max_position_embeddings: usize_or("max_position_embeddings", 512),
        type_vocab_size: usize_or("type_vocab_size", 2),
        initializer_range: 0.02,
        layer_norm_eps: json["layer_norm_eps"].as_f64().unwrap_or(1e-12),
        pad_token_id: usize_or("pad_token_id", 0),
        position_embedding_type: PositionEmbeddingType::Absolute,
        use_cache: true,
        classifier_dropout: None,
        model_type: Some(json["model_type"].as_str().unwrap_or("bert").to_string()),
    }
}

/// Build the class-index -> tag table from `id2label`.
fn tags_from_json(json: &serde_json::Value) -> Result<Vec<Tag>> {
    let labels: Vec<(usize, &str)> = json["id2label"]
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| Some((k.parse().ok()?, v.as_str()?)))
                .collect()
        })
        .unwrap_or_default();

    let Some(max_id) = labels.iter().map(|(id, _)| *id).max() else {
        return Err(NerError::ModelLoad(format!("{} has no id2label table", CONFIG_FILE)));
    };

    let mut tags = vec![Tag::Outside; max_id + 1];
    for (id, label) in labels {
        tags[id] = Tag::parse(label);
    }
    if tags.iter().all(|tag| *tag == Tag::Outside) {
        warn!("No MED7 categories in id2label; every token will decode as O");
    }
    Ok(tags)
}
