//! Seabee field uploader.
//!
//! Watches the mount root for a drone card and a staging drive, and runs
//! copy/upload transfers on request.

mod config;
mod console;

use std::sync::Arc;

use seabee_engine::Orchestrator;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use config::UploaderConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,seabee=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = UploaderConfig::load()?;
    tracing::info!(config = %cfg.file_path().display(), "configuration loaded");

    let engine = Arc::new(Orchestrator::new(cfg.engine));
    engine.start();

    let renderer = tokio::spawn(console::render_changes(Arc::clone(&engine)));
    let input = BufReader::new(tokio::io::stdin());

    tokio::select! {
        result = console::run_commands(Arc::clone(&engine), input) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "command input failed");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("interrupt received");
        }
    }

    renderer.abort();
    engine.shutdown().await;

    // The blocking stdin reader cannot be cancelled and would hold the
    // runtime open until the next newline.
    std::process::exit(0)
}
