//! Wire (JSON) shapes for the relay's HTTP surface (spec.md §6). Shared by
//! the router (client side), the node (registration/pickup loops), and the
//! relay (server side) so all three agree on one definition.

use serde::{Deserialize, Serialize};

use agentmail_crypto::{decode_key, encode_key, fingerprint, Identity};

use crate::envelope::{MessageEnvelope, PROTOCOL_VERSION};
use crate::error::AgentmailError;
use crate::model::{PeerInfo, PeerSource};

/// `POST /v0/register` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub fp: String,
    pub sign_pk: String,
    pub enc_pk: String,
    pub version: u16,
}

impl RegisterRequest {
    pub fn from_identity(identity: &Identity, name: &str) -> Self {
        Self {
            name: name.to_string(),
            fp: fingerprint(&identity.sign_pk),
            sign_pk: encode_key(identity.sign_pk.as_bytes()),
            enc_pk: encode_key(identity.enc_pk.as_bytes()),
            version: PROTOCOL_VERSION,
        }
    }
}

/// `GET /v0/lookup/{name}` 200 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    pub name: String,
    pub fp: String,
    pub sign_pk: String,
    pub enc_pk: String,
}

impl LookupResponse {
    pub fn from_peer(peer: &PeerInfo) -> Self {
        Self {
            name: peer.name.clone(),
            fp: peer.fp.clone(),
            sign_pk: encode_key(&peer.sign_pk),
            enc_pk: encode_key(&peer.enc_pk),
        }
    }

    /// Decode into a `PeerInfo` sourced from the relay. `endpoint` stays
    /// `None` — a relay-learned peer has no known direct address.
    pub fn into_peer_info(self) -> Result<PeerInfo, AgentmailError> {
        let sign_pk = decode_key(&self.sign_pk).map_err(AgentmailError::Crypto)?;
        let enc_pk = decode_key(&self.enc_pk).map_err(AgentmailError::Crypto)?;
        Ok(PeerInfo {
            fp: self.fp,
            name: self.name,
            sign_pk,
            enc_pk,
            endpoint: None,
            last_seen: 0,
            source: PeerSource::Relay,
        })
    }
}

/// `GET /v0/pickup/{fp}` 200 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupResponse {
    pub envelopes: Vec<MessageEnvelope>,
}

/// `GET /v0/stats` 200 response body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatsResponse {
    pub messages_held: u64,
    pub total_bytes: u64,
}

/// `GET /v0/health` 200 response body (ambient operability surface, not a
/// product feature — SPEC_FULL.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub fp: String,
    pub name: String,
}

/// `POST /v0/send` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub kind: Option<crate::model::MessageKind>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmail_crypto::generate_identity;

    #[test]
    fn register_request_round_trips_identity_keys() {
        let id = generate_identity();
        let req = RegisterRequest::from_identity(&id, "alice");
        assert_eq!(decode_key(&req.sign_pk).unwrap(), *id.sign_pk.as_bytes());
        assert_eq!(req.fp, fingerprint(&id.sign_pk));
    }

    #[test]
    fn lookup_response_round_trips_into_peer_info() {
        let id = generate_identity();
        let peer = PeerInfo {
            fp: fingerprint(&id.sign_pk),
            name: "bob".to_string(),
            sign_pk: id.sign_pk.to_bytes(),
            enc_pk: *id.enc_pk.as_bytes(),
            endpoint: Some("127.0.0.1:1".to_string()),
            last_seen: 5,
            source: PeerSource::Lan,
        };
        let wire = LookupResponse::from_peer(&peer);
        let back = wire.into_peer_info().unwrap();
        assert_eq!(back.fp, peer.fp);
        assert_eq!(back.sign_pk, peer.sign_pk);
        assert_eq!(back.enc_pk, peer.enc_pk);
        assert_eq!(back.source, PeerSource::Relay);
        assert_eq!(back.endpoint, None);
    }
}
