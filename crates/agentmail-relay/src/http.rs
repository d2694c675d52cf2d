//! The relay's HTTP surface (spec.md §6): register, lookup, deposit,
//! pickup, stats, and the ambient `/v0/health` liveness route
//! (SPEC_FULL.md §4.6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use agentmail_protocol::{
    HealthResponse, LookupResponse, MessageEnvelope, PickupResponse, RegisterRequest,
};

use crate::queue::EnvelopeQueue;
use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub queue: Arc<EnvelopeQueue>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v0/register", post(register))
        .route("/v0/lookup/:name", get(lookup))
        .route("/v0/lookup_fp/:fp", get(lookup_fp))
        .route("/v0/deposit", post(deposit))
        .route("/v0/pickup/:fp", get(pickup))
        .route("/v0/stats", get(stats))
        .route("/v0/health", get(health))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> impl IntoResponse {
    let name = req.name.clone();
    match state.registry.register(req) {
        Ok(()) => {
            tracing::info!(%name, "registered");
            StatusCode::OK.into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn lookup(State(state): State<AppState>, Path(name): Path<String>) -> impl IntoResponse {
    match state.registry.lookup(&name) {
        Some(resp) => Json(resp).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Looks up a registration by fingerprint rather than name, so a node
/// receiving an envelope from an unfamiliar `sender_fp` (SPEC_FULL.md §4.6)
/// can resolve the sender's identity without already knowing their name.
async fn lookup_fp(State(state): State<AppState>, Path(fp): Path<String>) -> impl IntoResponse {
    match state.registry.lookup_by_fp(&fp) {
        Some(peer) => Json(LookupResponse::from_peer(&peer)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn deposit(State(state): State<AppState>, Json(envelope): Json<MessageEnvelope>) -> impl IntoResponse {
    let recipient_fp = envelope.recipient_fp.clone();
    match state.queue.deposit(envelope) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(crate::queue::EnvelopeTooLarge) => {
            tracing::warn!(recipient_fp = %recipient_fp, "envelope exceeds recipient byte cap");
            StatusCode::PAYLOAD_TOO_LARGE.into_response()
        }
    }
}

async fn pickup(State(state): State<AppState>, Path(fp): Path<String>) -> impl IntoResponse {
    let envelopes = state.queue.pickup(&fp);
    Json(PickupResponse { envelopes })
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queue.stats())
}

async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok", fp: String::new(), name: "relay".to_string() })
}
