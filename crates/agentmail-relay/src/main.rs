use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use agentmail_relay::http::{self, AppState};
use agentmail_relay::queue::{EnvelopeQueue, MAX_BYTES_PER_RECIPIENT, MAX_ENTRIES_PER_RECIPIENT};
use agentmail_relay::registry::Registry;

/// The relay's name registry and store-and-forward inbox (spec.md §4.7)
/// — enough flags to start a process, not a general config file layer.
#[derive(Debug, Parser)]
#[command(name = "agentmail-relay", about = "Run the agentmail relay service")]
struct Cli {
    /// Port to bind the relay's HTTP surface on.
    #[arg(long, default_value_t = 7900)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let state = AppState {
        registry: Arc::new(Registry::new()),
        queue: Arc::new(EnvelopeQueue::new(MAX_ENTRIES_PER_RECIPIENT, MAX_BYTES_PER_RECIPIENT)),
    };

    let app = http::build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "relay listening");

    axum::serve(listener, app).await.context("relay http server exited")?;
    Ok(())
}
