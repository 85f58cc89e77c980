//! Install the MED7 model from Hugging Face, falling back to Dropbox.

use anyhow::Context;
use clap::Parser;
use med7_ner::config::{InstallArgs, init_tracing};
use med7_ner::installer::{Installer, ModelSource};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = InstallArgs::parse();
    init_tracing(&args.log_filter);

    let installer = Installer::new(args.target_dir(), args.timeout())
        .context("Failed to build the download client")?
        .with_sources(
            ModelSource::primary(&args.primary_url),
            ModelSource::fallback(&args.fallback_url),
        );

    let report = installer
        .install_with_fallback()
        .await
        .context("Error installing model")?;

    info!("Installed from {} into {}", report.source, report.target_dir.display());
    Ok(())
}
