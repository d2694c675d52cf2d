/// Canonical (byte-deterministic) encoding used for both the signature
/// domain and cross-node interop: JSON with ASCII-sorted keys, no
/// insignificant whitespace, UTF-8, decimal integers, and base64
/// URL-safe (no padding) for binary fields.
///
/// Implemented as a dedicated encoder writing fields directly in their
/// sorted order rather than round-tripping through a generic JSON value
/// reorderer — cheaper, and it removes a class of "two serializers
/// disagree" bugs.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::payload::MessagePayload;

fn json_string(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization cannot fail")
}

/// Canonical bytes of a `MessagePayload`. Field order (ASCII-sorted on
/// field name): body, created_at, from_addr, kind, nonce, subject, to_addr.
pub fn canonical_payload_bytes(payload: &MessagePayload) -> Vec<u8> {
    format!(
        "{{\"body\":{},\"created_at\":{},\"from_addr\":{},\"kind\":{},\"nonce\":{},\"subject\":{},\"to_addr\":{}}}",
        json_string(&payload.body),
        payload.created_at,
        json_string(&payload.from_addr),
        json_string(payload.kind.as_str()),
        payload.nonce,
        json_string(&payload.subject),
        json_string(&payload.to_addr),
    )
    .into_bytes()
}

/// Canonical bytes signed by the envelope's Ed25519 signature: the
/// envelope with `signature` omitted. Field order (ASCII-sorted):
/// ciphertext, recipient_fp, sender_fp, sent_at, version.
pub fn canonical_envelope_signing_bytes(
    version: u16,
    sender_fp: &str,
    recipient_fp: &str,
    ciphertext: &[u8],
    sent_at: u64,
) -> Vec<u8> {
    format!(
        "{{\"ciphertext\":{},\"recipient_fp\":{},\"sender_fp\":{},\"sent_at\":{},\"version\":{}}}",
        json_string(&URL_SAFE_NO_PAD.encode(ciphertext)),
        json_string(recipient_fp),
        json_string(sender_fp),
        sent_at,
        version,
    )
    .into_bytes()
}
