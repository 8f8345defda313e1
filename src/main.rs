//! Verisift server binary.
//!
//! # Usage
//!
//! ```bash
//! # Rule-only pipeline (no LM configured)
//! cargo run --release
//!
//! # With an OpenAI-compatible LM and live web retrieval
//! VERISIFT_LLM_ENABLED=true \
//! VERISIFT_LLM_API_KEY=sk-... \
//! VERISIFT_WEB_RETRIEVAL_ENABLED=true \
//! cargo run --release
//! ```
//!
//! # Environment Variables
//!
//! All options carry the `VERISIFT_` prefix; see `config`. `RUST_LOG`
//! controls log filtering (default: info).

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use verisift::{create_app, AppState};

#[derive(Parser, Debug)]
#[command(name = "verisift")]
#[command(about = "Conversational fact-check orchestrator")]
#[command(version)]
struct CliArgs {
    /// Override the server bind address (default: "0.0.0.0:8080")
    #[arg(short, long, env = "VERISIFT_SERVER_ADDR")]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG and VERISIFT_* from the file are visible.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let addr = args.addr.unwrap_or_else(|| "0.0.0.0:8080".to_string());

    let state = AppState::new();
    let app = create_app(state);

    info!(%addr, "verisift server starting");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}
