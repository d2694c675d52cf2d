use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519Secret};

use crate::error::CryptoError;

/// A node's long-lived cryptographic identity: an Ed25519 signing keypair
/// and an independently generated X25519 encryption keypair.
///
/// Persisted once at first start; the core never rotates it.
#[derive(Clone)]
pub struct Identity {
    pub sign_sk: SigningKey,
    pub sign_pk: VerifyingKey,
    pub enc_sk: X25519Secret,
    pub enc_pk: X25519PublicKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("fp", &fingerprint(&self.sign_pk))
            .finish()
    }
}

/// Generate a fresh identity from the OS CSPRNG.
///
/// The signing and encryption keypairs are generated independently — this
/// diverges deliberately from schemes that derive one from the other
/// (e.g. Ed25519→X25519 birational conversion): the encryption key must
/// stand on its own so a compromise of one key's use doesn't imply the
/// other.
pub fn generate_identity() -> Identity {
    let mut sign_seed = [0u8; 32];
    OsRng.fill_bytes(&mut sign_seed);
    let sign_sk = SigningKey::from_bytes(&sign_seed);
    let sign_pk = sign_sk.verifying_key();

    let mut enc_seed = [0u8; 32];
    OsRng.fill_bytes(&mut enc_seed);
    let enc_sk = X25519Secret::from(enc_seed);
    let enc_pk = X25519PublicKey::from(&enc_sk);

    Identity {
        sign_sk,
        sign_pk,
        enc_sk,
        enc_pk,
    }
}

/// First 16 characters of the URL-safe (no padding) base64 encoding of a
/// signing public key. The node's stable, URL-safe identifier.
pub fn fingerprint(sign_pk: &VerifyingKey) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(sign_pk.as_bytes());
    encoded.chars().take(16).collect()
}

/// Sign `bytes` with `sign_sk`, producing a 64-byte Ed25519 signature.
pub fn sign(sign_sk: &SigningKey, bytes: &[u8]) -> [u8; 64] {
    sign_sk.sign(bytes).to_bytes()
}

/// Verify a 64-byte Ed25519 signature over `bytes` against `sign_pk`.
pub fn verify(sign_pk: &VerifyingKey, bytes: &[u8], sig: &[u8]) -> bool {
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    sign_pk.verify(bytes, &signature).is_ok()
}

/// Decode a base64 (URL-safe, no padding) public key into a fixed-size array.
pub fn decode_key(encoded: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::BadKey {
            reason: format!("invalid base64: {e}"),
        })?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::BadKey {
        reason: "key must be 32 bytes".into(),
    })
}

/// Encode a 32-byte key as URL-safe base64 without padding.
pub fn encode_key(key: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

pub fn sign_pk_from_bytes(bytes: [u8; 32]) -> Result<VerifyingKey, CryptoError> {
    VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::BadKey {
        reason: e.to_string(),
    })
}

pub fn sign_sk_from_bytes(bytes: [u8; 32]) -> SigningKey {
    SigningKey::from_bytes(&bytes)
}
