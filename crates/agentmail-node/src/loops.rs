/// Background orchestrator: thin `tokio::select!` over timers, each tick
/// delegating to an already-built operation (registration, pickup, outbox
/// drain). Mirrors the runtime-loop shape used elsewhere in the pack —
/// multiplex timers, execute the effect, loop.
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use agentmail_protocol::RegisterRequest;
use agentmail_router::{transport, Router as DeliveryRouter};

use crate::http::{accept_envelope, AppState};

pub async fn run(state: AppState, router: Arc<DeliveryRouter>, relay: Option<String>, http: reqwest::Client, config: &crate::config::NodeConfig) {
    let mut registration = tokio::time::interval(config.registration_interval);
    let mut pickup = tokio::time::interval(config.pickup_interval);
    let mut outbox = tokio::time::interval(config.outbox_tick);

    loop {
        tokio::select! {
            _ = registration.tick() => {
                if let Some(relay) = &relay {
                    tick_registration(&http, relay, &state, config.relay_timeout).await;
                }
            }
            _ = pickup.tick() => {
                if let Some(relay) = &relay {
                    tick_pickup(&http, relay, &state, config.relay_timeout).await;
                }
            }
            _ = outbox.tick() => {
                tick_outbox(&router).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }
}

async fn tick_registration(http: &reqwest::Client, relay: &str, state: &AppState, timeout: Duration) {
    let req = RegisterRequest::from_identity(&state.identity, &state.name);
    match transport::register(http, relay, &req, timeout).await {
        Ok(()) => debug!(relay, "registered with relay"),
        Err(e) => warn!(relay, error = %e, "relay registration failed"),
    }
}

async fn tick_pickup(http: &reqwest::Client, relay: &str, state: &AppState, timeout: Duration) {
    let envelopes = match transport::pickup(http, relay, &state.fp, timeout).await {
        Ok(envelopes) => envelopes,
        Err(e) => {
            warn!(relay, error = %e, "relay pickup failed");
            return;
        }
    };
    for envelope in envelopes {
        let result =
            accept_envelope(&state.mailbox, &state.identity, &envelope, Some(relay), http, timeout).await;
        if let Err(e) = result {
            warn!(sender_fp = %envelope.sender_fp, error = %e, "dropped envelope picked up from relay");
        }
    }
}

async fn tick_outbox(router: &DeliveryRouter) {
    match router.drain_once().await {
        Ok(n) if n > 0 => debug!(count = n, "outbox drain tick processed entries"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "outbox drain tick failed"),
    }
}
