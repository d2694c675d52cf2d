//! The node's inbound HTTP surface (spec.md §6): receive, inbox, send,
//! and the ambient `/v0/health` liveness route (SPEC_FULL.md §4.6).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use agentmail_crypto::{sign_pk_from_bytes, CryptoError, Identity};
use agentmail_mailbox::Mailbox;
use agentmail_protocol::{
    verify_and_open, AgentmailError, Direction, HealthResponse, MessageEnvelope, MessageKind,
    MessageStatus, PeerInfo, SendRequest, StoredMessage,
};
use agentmail_router::{transport, Router as DeliveryRouter};

#[derive(Clone)]
pub struct AppState {
    pub mailbox: Arc<Mailbox>,
    pub router: Arc<DeliveryRouter>,
    pub identity: Identity,
    pub name: String,
    pub fp: String,
    pub relay: Option<String>,
    pub http: reqwest::Client,
    pub relay_timeout: Duration,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v0/receive", post(receive))
        .route("/v0/inbox", get(inbox))
        .route("/v0/send", post(send))
        .route("/v0/health", get(health))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Resolve an envelope's claimed sender: the local mailbox first, then a
/// relay fingerprint lookup (SPEC_FULL.md §4.6) so a node that has never
/// talked to this sender directly can still verify and accept mail from
/// them, provided the relay has a registration for that fingerprint. The
/// looked-up peer is pinned into the mailbox via `upsert_peer`, so a
/// fingerprint that collides with an already-pinned name still surfaces
/// `PeerConflict` rather than being trusted.
async fn resolve_sender(
    mailbox: &Mailbox,
    sender_fp: &str,
    relay: Option<&str>,
    http: &reqwest::Client,
    relay_timeout: Duration,
) -> Result<PeerInfo, AgentmailError> {
    if let Some(peer) = mailbox.get_peer_by_name_or_fp(sender_fp)? {
        return Ok(peer);
    }

    if let Some(relay) = relay {
        if let Some(found) = transport::lookup_fp(http, relay, sender_fp, relay_timeout).await? {
            let peer = found.into_peer_info()?;
            return mailbox.upsert_peer(peer).map_err(Into::into);
        }
    }

    Err(AgentmailError::UnknownSender(sender_fp.to_string()))
}

/// Verify, decrypt, and persist one envelope. Shared by the `/v0/receive`
/// handler and the relay pickup loop — both accept envelopes the same way.
pub(crate) async fn accept_envelope(
    mailbox: &Mailbox,
    identity: &Identity,
    envelope: &MessageEnvelope,
    relay: Option<&str>,
    http: &reqwest::Client,
    relay_timeout: Duration,
) -> Result<(), AgentmailError> {
    let sender = resolve_sender(mailbox, &envelope.sender_fp, relay, http, relay_timeout).await?;
    let sender_pk = sign_pk_from_bytes(sender.sign_pk)?;
    let payload = verify_and_open(envelope, identity, &sender_pk)?;

    let envelope_blob = serde_json::to_vec(envelope)
        .map_err(|e| AgentmailError::InvalidEnvelope { reason: e.to_string() })?;
    let msg = StoredMessage {
        id: agentmail_protocol::new_id(),
        direction: Direction::In,
        from_addr: payload.from_addr,
        to_addr: payload.to_addr,
        subject: payload.subject,
        body: payload.body,
        kind: payload.kind,
        created_at: payload.created_at,
        delivered_at: Some(payload.created_at),
        status: MessageStatus::Delivered,
        attempts: 0,
        envelope_blob,
        sender_fp: Some(envelope.sender_fp.clone()),
        nonce: Some(payload.nonce),
    };
    mailbox.insert_inbound(msg)?;
    Ok(())
}

async fn receive(State(state): State<AppState>, Json(envelope): Json<MessageEnvelope>) -> impl IntoResponse {
    let result = accept_envelope(
        &state.mailbox,
        &state.identity,
        &envelope,
        state.relay.as_deref(),
        &state.http,
        state.relay_timeout,
    )
    .await;
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(AgentmailError::UnknownSender(_)) => (StatusCode::BAD_REQUEST, "unknown sender").into_response(),
        Err(AgentmailError::Crypto(CryptoError::BadSig)) => {
            (StatusCode::UNAUTHORIZED, "signature verification failed").into_response()
        }
        Err(AgentmailError::Crypto(CryptoError::DecryptFail)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "decryption failed").into_response()
        }
        Err(e @ AgentmailError::Mailbox(_)) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct InboxQuery {
    cursor: Option<String>,
    limit: Option<usize>,
}

async fn inbox(State(state): State<AppState>, Query(q): Query<InboxQuery>) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(50).min(500);
    match state.mailbox.inbox(q.cursor.as_deref(), limit) {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn send(State(state): State<AppState>, Json(req): Json<SendRequest>) -> impl IntoResponse {
    let to: agentmail_protocol::Address = match req.to.parse() {
        Ok(addr) => addr,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{e}")).into_response(),
    };
    let from_addr = format!("{}@{}.local", state.name, state.name);
    let kind = req.kind.unwrap_or(MessageKind::Message);

    match state.router.send(&from_addr, &to, &req.subject, &req.body, kind).await {
        Ok(id) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "id": id }))).into_response(),
        Err(AgentmailError::UnknownRecipient(_)) => {
            (StatusCode::NOT_FOUND, "unknown recipient").into_response()
        }
        Err(e @ AgentmailError::PeerConflict(_)) => (StatusCode::CONFLICT, e.to_string()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        fp: state.fp.clone(),
        name: state.name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmail_crypto::{fingerprint, generate_identity};
    use agentmail_protocol::{build_envelope, Clock, FixedClock, MessagePayload, PeerInfo, PeerSource};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn peer_for(identity: &Identity, name: &str) -> PeerInfo {
        PeerInfo {
            fp: fingerprint(&identity.sign_pk),
            name: name.to_string(),
            sign_pk: identity.sign_pk.to_bytes(),
            enc_pk: *identity.enc_pk.as_bytes(),
            endpoint: None,
            last_seen: 0,
            source: PeerSource::Manual,
        }
    }

    fn state_for(identity: Identity, name: &str) -> (AppState, Arc<Mailbox>) {
        let mailbox = Arc::new(Mailbox::open_in_memory().unwrap());
        let fp = fingerprint(&identity.sign_pk);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(1_000));
        let router = Arc::new(DeliveryRouter::new(
            mailbox.clone(),
            identity.clone(),
            clock,
            None,
            Default::default(),
        ));
        (
            AppState {
                mailbox: mailbox.clone(),
                router,
                identity,
                name: name.to_string(),
                fp,
                relay: None,
                http: reqwest::Client::new(),
                relay_timeout: Duration::from_secs(5),
            },
            mailbox,
        )
    }

    #[tokio::test]
    async fn receive_accepts_a_valid_envelope_from_a_known_sender() {
        let bob = generate_identity();
        let (state, mailbox) = state_for(bob.clone(), "bob");
        let alice = generate_identity();
        mailbox.upsert_peer(peer_for(&alice, "alice")).unwrap();

        let bob_peer = peer_for(&bob, "bob");
        let payload = MessagePayload::new("alice@alice.local", "bob@bob.local", "hi", "ping", MessageKind::Message, 1);
        let envelope = build_envelope(&payload, &alice, &bob_peer, 2);

        let app = build_router(state);
        let body = serde_json::to_vec(&envelope).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v0/receive")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mailbox.inbox(None, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn receive_rejects_an_envelope_from_an_unknown_sender() {
        let bob = generate_identity();
        let (state, _mailbox) = state_for(bob.clone(), "bob");
        let stranger = generate_identity();
        let bob_peer = peer_for(&bob, "bob");
        let payload = MessagePayload::new("x@x.local", "bob@bob.local", "hi", "ping", MessageKind::Message, 1);
        let envelope = build_envelope(&payload, &stranger, &bob_peer, 2);

        let app = build_router(state);
        let body = serde_json::to_vec(&envelope).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v0/receive")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn receive_accepts_an_envelope_from_a_sender_known_only_to_the_relay() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let bob = generate_identity();
        let (mut state, mailbox) = state_for(bob.clone(), "bob");
        let alice = generate_identity();
        let alice_fp = fingerprint(&alice.sign_pk);

        let lookup_response = agentmail_protocol::LookupResponse {
            name: "alice".to_string(),
            fp: alice_fp.clone(),
            sign_pk: agentmail_crypto::encode_key(alice.sign_pk.as_bytes()),
            enc_pk: agentmail_crypto::encode_key(alice.enc_pk.as_bytes()),
        };
        let relay = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v0/lookup_fp/{alice_fp}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&lookup_response))
            .mount(&relay)
            .await;
        state.relay = Some(relay.uri());

        let bob_peer = peer_for(&bob, "bob");
        let payload =
            MessagePayload::new("alice@alice.local", "bob@bob.local", "hi", "ping", MessageKind::Message, 1);
        let envelope = build_envelope(&payload, &alice, &bob_peer, 2);

        let app = build_router(state);
        let body = serde_json::to_vec(&envelope).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v0/receive")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mailbox.inbox(None, 10).unwrap().len(), 1);
        assert!(mailbox.get_peer_by_name_or_fp(&alice_fp).unwrap().is_some());
    }

    #[tokio::test]
    async fn health_reports_name_and_fingerprint() {
        let bob = generate_identity();
        let fp = fingerprint(&bob.sign_pk);
        let (state, _mailbox) = state_for(bob, "bob");
        let app = build_router(state);
        let response = app
            .oneshot(Request::builder().uri("/v0/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health.fp, fp);
        assert_eq!(health.name, "bob");
    }
}
