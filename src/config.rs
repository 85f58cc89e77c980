//! Command-line and environment configuration for both binaries.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::installer::{FALLBACK_URL, PRIMARY_URL};
use crate::ner::BertConfig;

/// Which recognizer the service loads at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// BERT token classifier from the model directory.
    Bert,
    /// Built-in gazetteer and pattern rules; needs no model files.
    Lexicon,
}

/// Where installed models live unless `--model-dir`/`--target-dir` says otherwise.
pub fn default_model_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("med7-ner")
}

#[derive(Debug, Clone, Parser)]
#[command(name = "med7-ner", version, about = "Medical named entity recognition over HTTP")]
pub struct ServerArgs {
    #[arg(long, env = "MED7_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(long, env = "MED7_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory searched for the model export.
    #[arg(long, env = "MED7_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    #[arg(long, env = "MED7_BACKEND", value_enum, default_value_t = Backend::Bert)]
    pub backend: Backend,

    /// Maximum sequence length per forward pass, special tokens included.
    #[arg(long, env = "MED7_MAX_LENGTH", default_value_t = 512)]
    pub max_length: usize,

    #[arg(long, env = "MED7_USE_GPU")]
    pub use_gpu: bool,

    #[arg(long, env = "MED7_MAX_BATCH_SIZE", default_value_t = crate::DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Largest accepted request body in bytes; bigger bodies get a 413.
    #[arg(long, env = "MED7_MAX_BODY_BYTES", default_value_t = crate::DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Keep serving when the model fails to load; inference then returns 503.
    #[arg(long, env = "MED7_ALLOW_MISSING_MODEL")]
    pub allow_missing_model: bool,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl ServerArgs {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(default_model_dir)
    }

    pub fn bert_config(&self) -> BertConfig {
        BertConfig {
            max_length: self.max_length,
            use_gpu: self.use_gpu,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "med7-install-model", version, about = "Download and unpack the MED7 model")]
pub struct InstallArgs {
    /// Directory the archive is unpacked into.
    #[arg(long, env = "MED7_MODEL_DIR")]
    pub target_dir: Option<PathBuf>,

    /// Wheel (zip) tried first.
    #[arg(long, env = "MED7_PRIMARY_URL", default_value = PRIMARY_URL)]
    pub primary_url: String,

    /// Gzip tarball tried when the primary source fails.
    #[arg(long, env = "MED7_FALLBACK_URL", default_value = FALLBACK_URL)]
    pub fallback_url: String,

    /// Per-request timeout for each download.
    #[arg(long, env = "MED7_DOWNLOAD_TIMEOUT_SECS", default_value_t = 600)]
    pub timeout_secs: u64,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

impl InstallArgs {
    pub fn target_dir(&self) -> PathBuf {
        self.target_dir.clone().unwrap_or_else(default_model_dir)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Install the fmt subscriber; unparsable directives are skipped.
pub fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().parse_lossy(filter))
        .with_target(true)
        .init();
}
