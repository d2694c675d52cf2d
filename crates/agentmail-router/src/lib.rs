//! The outbound delivery state machine (spec.md §4.5): resolve a recipient,
//! build the envelope, attempt direct delivery, fall back to the relay,
//! and otherwise queue the attempt in the mailbox's outbox for retry with
//! exponential backoff.

mod backoff;
mod config;
pub mod transport;

use std::sync::Arc;

use tracing::{info, warn};

use agentmail_crypto::Identity;
use agentmail_mailbox::Mailbox;
use agentmail_protocol::{
    build_envelope, Address, AgentmailError, Clock, MessageEnvelope, MessageKind, MessagePayload,
    OutboxEntry, PeerInfo, StoredMessage, Tier, UnknownRecipient,
};

pub use backoff::{ceiling_reached, next_try_at};
pub use config::RouterConfig;

/// Drives outbound sends and the outbox drain loop for one node.
pub struct Router {
    mailbox: Arc<Mailbox>,
    identity: Identity,
    clock: Arc<dyn Clock>,
    relay_base: Option<String>,
    http: reqwest::Client,
    config: RouterConfig,
}

impl Router {
    pub fn new(
        mailbox: Arc<Mailbox>,
        identity: Identity,
        clock: Arc<dyn Clock>,
        relay_base: Option<String>,
        config: RouterConfig,
    ) -> Self {
        Self {
            mailbox,
            identity,
            clock,
            relay_base,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// RESOLVING: a relay lookup, when configured, is consulted before a
    /// local hit is trusted — not only when the local mailbox is empty for
    /// this name. A local record is pinned the moment it's recorded, so
    /// checking the relay only on a local miss would mean a later identity
    /// rotation (a name re-registering under a different fingerprint) is
    /// never caught: the local hit would keep winning forever. Routing the
    /// relay's answer through `upsert_peer` surfaces that as `PeerConflict`
    /// (spec.md §9's `IdentityConflict`) instead of silently trusting
    /// either side. Falls back to the local record when the relay has none
    /// (unregistered or LAN-only peer); `UnknownRecipient` if neither does.
    async fn resolve(&self, addr: &Address) -> Result<PeerInfo, AgentmailError> {
        if let Some(relay) = &self.relay_base {
            if let Some(found) =
                transport::lookup(&self.http, relay, &addr.name, self.config.relay_timeout).await?
            {
                let peer = found.into_peer_info()?;
                return self.mailbox.upsert_peer(peer).map_err(Into::into);
            }
        }

        if let Some(peer) = self.mailbox.get_peer_by_name_or_fp(&addr.name)? {
            return Ok(peer);
        }

        Err(UnknownRecipient(addr.to_string()).into())
    }

    /// The full `send` procedure (spec.md §4.5 steps 1-5): resolve, build
    /// and persist the envelope, then make one immediate delivery attempt.
    /// Returns the new message's id whether or not the immediate attempt
    /// succeeds — a queued entry is picked up by the next drain tick.
    pub async fn send(
        &self,
        from_addr: &str,
        to: &Address,
        subject: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<String, AgentmailError> {
        let peer = self.resolve(to).await?;
        let now = self.clock.now_ms();

        let payload = MessagePayload::new(from_addr, to.to_string(), subject, body, kind, now);
        let envelope = build_envelope(&payload, &self.identity, &peer, now);
        let envelope_bytes = serde_json::to_vec(&envelope)
            .map_err(|e| AgentmailError::InvalidEnvelope { reason: e.to_string() })?;

        let message_id = agentmail_protocol::new_id();
        let msg = StoredMessage {
            id: message_id.clone(),
            direction: agentmail_protocol::Direction::Out,
            from_addr: from_addr.to_string(),
            to_addr: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            kind,
            created_at: now,
            delivered_at: None,
            status: agentmail_protocol::MessageStatus::Pending,
            attempts: 0,
            envelope_blob: envelope_bytes.clone(),
            sender_fp: None,
            nonce: Some(payload.nonce),
        };
        let entry = OutboxEntry {
            id: agentmail_protocol::new_id(),
            message_id: message_id.clone(),
            envelope: envelope_bytes,
            target_fp: peer.fp.clone(),
            next_try_at: now,
            attempts: 0,
            last_error: None,
            tier: Tier::Direct,
        };
        self.mailbox.insert_outbound(msg, entry.clone())?;

        self.attempt(entry, Some(peer)).await;
        Ok(message_id)
    }

    /// One outbox drain tick: fetch due entries (already ordered by
    /// `(target_fp, next_try_at)`) and process each serially, so a single
    /// target's entries are never reordered within a scan.
    pub async fn drain_once(&self) -> Result<usize, AgentmailError> {
        let now = self.clock.now_ms();
        let due = self.mailbox.list_outbox_due(now, self.config.drain_batch)?;
        let count = due.len();
        for entry in due {
            self.attempt(entry, None).await;
        }
        Ok(count)
    }

    /// ATTEMPT_DIRECT → ATTEMPT_RELAY → QUEUED_OUTBOX|FAILED for one entry.
    /// `peer` is passed through when already resolved by `send` to avoid a
    /// redundant lookup on the first attempt.
    async fn attempt(&self, entry: OutboxEntry, peer: Option<PeerInfo>) {
        let peer = match peer {
            Some(p) => Some(p),
            None => self
                .mailbox
                .get_peer_by_name_or_fp(&entry.target_fp)
                .ok()
                .flatten(),
        };

        if let Some(peer) = &peer {
            if let Some(endpoint) = &peer.endpoint {
                match transport::deliver_direct(
                    &self.http,
                    endpoint,
                    &entry.envelope,
                    self.config.direct_timeout,
                )
                .await
                {
                    Ok(()) => {
                        info!(target_fp = %entry.target_fp, tier = "DIRECT", "delivered");
                        self.finish_delivered(&entry);
                        return;
                    }
                    Err(e) => warn!(target_fp = %entry.target_fp, error = %e, "direct delivery failed"),
                }
            }
        }

        if let Some(relay) = &self.relay_base {
            match transport::deposit(&self.http, relay, &entry.envelope, self.config.relay_timeout).await {
                Ok(()) => {
                    info!(target_fp = %entry.target_fp, tier = "RELAY", "delivered");
                    self.finish_delivered(&entry);
                    return;
                }
                Err(e) => warn!(target_fp = %entry.target_fp, error = %e, "relay deposit failed"),
            }
        }

        self.reschedule_or_fail(&entry, "direct and relay delivery both failed");
    }

    fn finish_delivered(&self, entry: &OutboxEntry) {
        let now = self.clock.now_ms();
        if let Err(e) = self.mailbox.mark_delivered(&entry.message_id, now) {
            warn!(message_id = %entry.message_id, error = %e, "failed to mark message delivered");
        }
    }

    fn reschedule_or_fail(&self, entry: &OutboxEntry, reason: &str) {
        let attempts = entry.attempts + 1;
        if ceiling_reached(attempts, self.config.attempt_ceiling) {
            if let Err(e) = self.mailbox.mark_failed(&entry.message_id, reason) {
                warn!(message_id = %entry.message_id, error = %e, "failed to mark message failed");
            }
            return;
        }
        let now = self.clock.now_ms();
        let next = next_try_at(now, entry.attempts, self.config.backoff_base_ms, self.config.backoff_cap_ms);
        if let Err(e) = self.mailbox.reschedule_outbox(&entry.id, next, attempts, reason) {
            warn!(entry_id = %entry.id, error = %e, "failed to reschedule outbox entry");
        }
    }
}

/// Serialize a `MessageEnvelope` the same way the router persists it to the
/// outbox, for use by inbound handlers replaying stored bytes.
pub fn envelope_from_bytes(bytes: &[u8]) -> Result<MessageEnvelope, AgentmailError> {
    serde_json::from_slice(bytes).map_err(|e| AgentmailError::InvalidEnvelope { reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmail_crypto::{fingerprint, generate_identity};
    use agentmail_protocol::{FixedClock, PeerSource};

    fn peer_for(identity: &Identity, name: &str, endpoint: Option<&str>) -> PeerInfo {
        PeerInfo {
            fp: fingerprint(&identity.sign_pk),
            name: name.to_string(),
            sign_pk: identity.sign_pk.to_bytes(),
            enc_pk: *identity.enc_pk.as_bytes(),
            endpoint: endpoint.map(|e| e.to_string()),
            last_seen: 0,
            source: PeerSource::Manual,
        }
    }

    #[tokio::test]
    async fn send_without_endpoint_or_relay_queues_entry() {
        let mailbox = Arc::new(Mailbox::open_in_memory().unwrap());
        let me = generate_identity();
        let bob = generate_identity();
        let bob_peer = peer_for(&bob, "bob", None);
        mailbox.upsert_peer(bob_peer).unwrap();

        let clock = Arc::new(FixedClock::new(1_000));
        let router = Router::new(mailbox.clone(), me, clock.clone(), None, RouterConfig::default());

        let to: Address = "bob@bob.local".parse().unwrap();
        let id = router.send("me@me.local", &to, "hi", "ping", MessageKind::Message).await.unwrap();

        let due = mailbox.list_outbox_due(u64::MAX, 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].message_id, id);
        assert_eq!(due[0].attempts, 1);
    }

    #[tokio::test]
    async fn send_to_unknown_recipient_fails() {
        let mailbox = Arc::new(Mailbox::open_in_memory().unwrap());
        let me = generate_identity();
        let clock = Arc::new(FixedClock::new(1_000));
        let router = Router::new(mailbox, me, clock, None, RouterConfig::default());

        let to: Address = "nobody@nobody.local".parse().unwrap();
        let err = router
            .send("me@me.local", &to, "hi", "ping", MessageKind::Message)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentmailError::UnknownRecipient(_)));
    }

    #[tokio::test]
    async fn send_fails_with_peer_conflict_when_a_known_name_rotates_fingerprint() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mailbox = Arc::new(Mailbox::open_in_memory().unwrap());
        let me = generate_identity();
        let bob = generate_identity();
        mailbox.upsert_peer(peer_for(&bob, "bob", None)).unwrap();

        let impostor = generate_identity();
        let lookup_response = agentmail_protocol::LookupResponse {
            name: "bob".to_string(),
            fp: fingerprint(&impostor.sign_pk),
            sign_pk: agentmail_crypto::encode_key(impostor.sign_pk.as_bytes()),
            enc_pk: agentmail_crypto::encode_key(impostor.enc_pk.as_bytes()),
        };

        let relay = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/lookup/bob"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&lookup_response))
            .mount(&relay)
            .await;

        let clock = Arc::new(FixedClock::new(1_000));
        let router = Router::new(mailbox.clone(), me, clock, Some(relay.uri()), RouterConfig::default());

        let to: Address = "bob@bob.local".parse().unwrap();
        let err = router
            .send("me@me.local", &to, "hi", "ping", MessageKind::Message)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentmailError::PeerConflict(_)));

        let stored = mailbox.get_peer_by_name_or_fp("bob").unwrap().unwrap();
        assert_eq!(stored.sign_pk, bob.sign_pk.to_bytes());
    }

    #[tokio::test]
    async fn drain_with_no_endpoint_reschedules() {
        let mailbox = Arc::new(Mailbox::open_in_memory().unwrap());
        let me = generate_identity();
        let bob = generate_identity();
        let bob_peer = peer_for(&bob, "bob", None);
        mailbox.upsert_peer(bob_peer).unwrap();

        let clock = Arc::new(FixedClock::new(1_000));
        let router = Router::new(mailbox.clone(), me, clock.clone(), None, RouterConfig::default());
        let to: Address = "bob@bob.local".parse().unwrap();
        router.send("me@me.local", &to, "s", "b", MessageKind::Message).await.unwrap();

        clock.set(10_000);
        let processed = router.drain_once().await.unwrap();
        assert_eq!(processed, 1);
        let due = mailbox.list_outbox_due(u64::MAX, 10).unwrap();
        assert_eq!(due[0].attempts, 2);
    }
}
