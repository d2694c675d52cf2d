use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use agentmail_crypto::{fingerprint, open, seal, sign, verify, Identity, X25519PublicKey};

use crate::canonical::{canonical_envelope_signing_bytes, canonical_payload_bytes};
use crate::error::AgentmailError;
use crate::model::PeerInfo;
use crate::payload::MessagePayload;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

fn serialize_b64<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
}

fn deserialize_b64<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(d)?;
    URL_SAFE_NO_PAD
        .decode(s.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// The signed, sealed outer wire form of a message. `ciphertext` is a
/// sealed-box encryption of the canonical payload under the recipient's
/// `enc_pk`; `signature` is an Ed25519 signature by the sender's
/// `sign_sk` over the canonical form of every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub version: u16,
    pub sender_fp: String,
    pub recipient_fp: String,
    #[serde(serialize_with = "serialize_b64", deserialize_with = "deserialize_b64")]
    pub ciphertext: Vec<u8>,
    #[serde(serialize_with = "serialize_b64", deserialize_with = "deserialize_b64")]
    pub signature: Vec<u8>,
    pub sent_at: u64,
}

/// Build a signed, sealed envelope for `payload`, addressed to
/// `recipient_peer` and sent by `sender_identity`. Pure — no I/O;
/// `sent_at` is supplied by the caller (typically from a `Clock`).
pub fn build_envelope(
    payload: &MessagePayload,
    sender_identity: &Identity,
    recipient_peer: &PeerInfo,
    sent_at: u64,
) -> MessageEnvelope {
    let recipient_enc_pk = X25519PublicKey::from(recipient_peer.enc_pk);
    let plaintext = canonical_payload_bytes(payload);
    let ciphertext = seal(&recipient_enc_pk, &plaintext);

    let sender_fp = fingerprint(&sender_identity.sign_pk);
    let signing_bytes = canonical_envelope_signing_bytes(
        PROTOCOL_VERSION,
        &sender_fp,
        &recipient_peer.fp,
        &ciphertext,
        sent_at,
    );
    let signature = sign(&sender_identity.sign_sk, &signing_bytes).to_vec();

    MessageEnvelope {
        version: PROTOCOL_VERSION,
        sender_fp,
        recipient_fp: recipient_peer.fp.clone(),
        ciphertext,
        signature,
        sent_at,
    }
}

/// Verify `envelope`'s signature against `known_sender_pk`, then decrypt
/// and parse its payload with `local_identity`'s encryption secret key.
/// Pure — no I/O.
pub fn verify_and_open(
    envelope: &MessageEnvelope,
    local_identity: &Identity,
    known_sender_pk: &agentmail_crypto::VerifyingKey,
) -> Result<MessagePayload, AgentmailError> {
    let signing_bytes = canonical_envelope_signing_bytes(
        envelope.version,
        &envelope.sender_fp,
        &envelope.recipient_fp,
        &envelope.ciphertext,
        envelope.sent_at,
    );
    if !verify(known_sender_pk, &signing_bytes, &envelope.signature) {
        return Err(agentmail_crypto::CryptoError::BadSig.into());
    }

    let plaintext = open(&local_identity.enc_sk, &envelope.ciphertext)?;
    serde_json::from_slice(&plaintext).map_err(|e| AgentmailError::InvalidEnvelope {
        reason: format!("malformed payload after decrypt: {e}"),
    })
}
