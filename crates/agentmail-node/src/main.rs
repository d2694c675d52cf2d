use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use agentmail_crypto::fingerprint;
use agentmail_discovery::Discovery;
use agentmail_mailbox::Mailbox;
use agentmail_protocol::SystemClock;
use agentmail_router::{Router as DeliveryRouter, RouterConfig};

use agentmail_node::config::{Cli, NodeConfig};
use agentmail_node::http::{self, AppState};
use agentmail_node::{identity_store, loops};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config: NodeConfig = Cli::parse().into();

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let identity = identity_store::load_or_generate(&config.data_dir)?;
    let fp = fingerprint(&identity.sign_pk);
    tracing::info!(name = %config.name, port = config.port, fp = %fp, "starting agentmail node");

    let mailbox = Arc::new(
        Mailbox::open(&config.data_dir.join("mailbox.db"))
            .context("opening mailbox store")?,
    );

    let router_config = RouterConfig {
        direct_timeout: config.direct_timeout,
        relay_timeout: config.relay_timeout,
        ..RouterConfig::default()
    };
    let router = Arc::new(DeliveryRouter::new(
        mailbox.clone(),
        identity.clone(),
        Arc::new(SystemClock),
        config.relay.clone(),
        router_config,
    ));

    let discovery = Discovery::start(&identity, &config.name, config.port, mailbox.clone())
        .context("starting LAN discovery")?;

    let http_client = reqwest::Client::new();
    let state = AppState {
        mailbox: mailbox.clone(),
        router: router.clone(),
        identity: identity.clone(),
        name: config.name.clone(),
        fp: fp.clone(),
        relay: config.relay.clone(),
        http: http_client.clone(),
        relay_timeout: config.relay_timeout,
    };

    let app = http::build_router(state.clone());
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "http server exited");
        }
    });

    loops::run(state, router, config.relay.clone(), http_client, &config).await;

    server.abort();
    if let Err(e) = discovery.shutdown() {
        tracing::warn!(error = %e, "discovery shutdown error");
    }
    Ok(())
}
