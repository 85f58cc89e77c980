use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use med7_ner::config::{ServerArgs, init_tracing};
use med7_ner::{AppState, api, ner};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    init_tracing(&args.log_filter);

    let state = load_state(&args).await?;

    let addr = args.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("MED7 NER API starting on http://{}", addr);
    info!("Available endpoints:");
    for (method, path, summary) in api::health::ENDPOINTS {
        info!("  - {:<5}{:<15} - {}", method, path, summary);
    }

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("Server stopped, model released");
    Ok(())
}

async fn load_state(args: &ServerArgs) -> anyhow::Result<AppState> {
    let model_dir = args.model_dir();
    let backend = args.backend;
    let config = args.bert_config();

    info!("Loading MED7 model ({:?} backend)...", backend);
    let start = Instant::now();
    let loaded = tokio::task::spawn_blocking(move || ner::load(backend, &model_dir, config))
        .await
        .context("Model loading task failed")?;

    let state = match loaded {
        Ok(model) => {
            info!("MED7 model '{}' loaded in {:?}", model.name(), start.elapsed());
            AppState::new(model)
        }
        Err(e) if args.allow_missing_model => {
            error!("Failed to load MED7 model: {}", e);
            warn!("Continuing without a model; inference endpoints will return 503");
            AppState::without_model()
        }
        Err(e) => {
            error!("Failed to load MED7 model: {}", e);
            return Err(e).context("Failed to load MED7 model");
        }
    };

    Ok(state
        .with_max_batch_size(args.max_batch_size)
        .with_max_body_bytes(args.max_body_bytes))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
