//! Model installer: download a packaged model and unpack it into the
//! directory the service loads from.
//!
//! Two sources form a fallback chain. Each is tried once; there is no
//! retry within a source.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::ner::locate_model_dir;

pub const PRIMARY_URL: &str =
    "https://huggingface.co/kormilitzin/en_core_med7_lg/resolve/main/en_core_med7_lg-any-py3-none-any.whl";
pub const FALLBACK_URL: &str = "https://www.dropbox.com/s/xbgsy6tyctvrqz3/en_core_med7_lg.tar.gz?dl=1";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download from {url} returned status {status}")]
    Status { url: String, status: reqwest::StatusCode },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("primary source failed ({primary}); fallback source failed ({fallback})")]
    AllSourcesFailed {
        primary: Box<InstallError>,
        fallback: Box<InstallError>,
    },
}

pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Python wheel, which is a zip archive.
    Wheel,
    TarGz,
}

impl ArchiveFormat {
    fn suffix(&self) -> &'static str {
        match self {
            ArchiveFormat::Wheel => ".whl",
            ArchiveFormat::TarGz => ".tar.gz",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSource {
    pub name: String,
    pub url: String,
    pub format: ArchiveFormat,
}

impl ModelSource {
    pub fn primary(url: impl Into<String>) -> Self {
        Self {
            name: "Hugging Face".to_string(),
            url: url.into(),
            format: ArchiveFormat::Wheel,
        }
    }

    pub fn fallback(url: impl Into<String>) -> Self {
        Self {
            name: "Dropbox".to_string(),
            url: url.into(),
            format: ArchiveFormat::TarGz,
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub source: String,
    pub target_dir: PathBuf,
    /// Loadable model directory found in the unpacked tree, if any.
    pub model_dir: Option<PathBuf>,
}

pub struct Installer {
    client: reqwest::Client,
    target_dir: PathBuf,
    primary: ModelSource,
    fallback: ModelSource,
}

impl Installer {
    pub fn new(target_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            target_dir: target_dir.into(),
            primary: ModelSource::primary(PRIMARY_URL),
            fallback: ModelSource::fallback(FALLBACK_URL),
        })
    }

    pub fn with_sources(mut self, primary: ModelSource, fallback: ModelSource) -> Self {
        self.primary = primary;
        self.fallback = fallback;
        self
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub async fn install_from_primary_source(&self) -> Result<InstallReport> {
        self.install(&self.primary).await
    }

    pub async fn install_from_fallback_source(&self) -> Result<InstallReport> {
        self.install(&self.fallback).await
    }

    /// Try the primary source, then the fallback. Fails only when both do.
    pub async fn install_with_fallback(&self) -> Result<InstallReport> {
        info!("Attempting to install from {}...", self.primary.name);
        let primary = match self.install_from_primary_source().await {
            Ok(report) => return Ok(report),
            Err(e) => e,
        };
        error!("{} installation failed: {}", self.primary.name, primary);
        info!("Trying {} as fallback...", self.fallback.name);

        match self.install_from_fallback_source().await {
            Ok(report) => Ok(report),
            Err(fallback) => {
                error!("{} installation failed: {}", self.fallback.name, fallback);
                Err(InstallError::AllSourcesFailed {
                    primary: Box::new(primary),
                    fallback: Box::new(fallback),
                })
            }
        }
    }

    /// Download `source` into a temp file, unpack it into the target
    /// directory, then remove the temp file.
    pub async fn install(&self, source: &ModelSource) -> Result<InstallReport> {
        tokio::fs::create_dir_all(&self.target_dir).await?;

        let archive = tempfile::Builder::new()
            .prefix("med7-model-")
            .suffix(source.format.suffix())
            .tempfile()?;

        info!("Downloading model from {} ({})...", source.name, source.url);
        let bytes = self.download(&source.url, archive.path()).await?;
        info!("Downloaded {} bytes", bytes);

        info!("Extracting model into {}...", self.target_dir.display());
        let format = source.format;
        let archive_path = archive.path().to_path_buf();
        let target = self.target_dir.clone();
        tokio::task::spawn_blocking(move || extract(format, &archive_path, &target)).await??;

        info!("Cleaning up...");
        archive.close()?;

        let model_dir = locate_model_dir(&self.target_dir);
        match &model_dir {
            Some(dir) => info!("Model installed successfully at {}", dir.display()),
            None => warn!(
                "Archive from {} unpacked into {}, but it holds no config.json/tokenizer.json/model.safetensors \
                 export; the BERT backend will not be able to load it",
                source.name,
                self.target_dir.display()
            ),
        }

        Ok(InstallReport {
            source: source.name.clone(),
            target_dir: self.target_dir.clone(),
            model_dir,
        })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(InstallError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Unpack `archive` into `dest`. Entries that would land outside `dest`
/// are rejected by both archive readers.
pub fn extract(format: ArchiveFormat, archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    match format {
        ArchiveFormat::Wheel => {
            let mut zip = zip::ZipArchive::new(file)?;
            zip.extract(dest)?;
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(file));
            tar.unpack(dest)?;
        }
    }
    Ok(())
}
