/// Anonymous sealed-box encryption: ephemeral X25519 Diffie-Hellman +
/// HKDF-SHA256 key derivation + XChaCha20-Poly1305 AEAD.
///
/// The sealed-box ciphertext is self-describing (it carries the sender's
/// ephemeral public key) and is not forgeable by an attacker lacking the
/// recipient's encryption secret key. It does not authenticate the
/// sender — that is the envelope signature's job (see `agentmail-protocol`).
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519Secret};

use crate::error::CryptoError;

const HKDF_INFO: &[u8] = b"agentmail-sealed-box-xchacha20poly1305-v1";
const EPHEMERAL_PK_LEN: usize = 32;
const NONCE_LEN: usize = 24;

fn derive_key(shared_secret: &[u8; 32]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut key)
        .expect("HKDF-SHA256 expand to 32 bytes always succeeds");
    key
}

/// Seal `plaintext` for the holder of `recipient_enc_pk`.
///
/// Wire format: `ephemeral_pk (32) || nonce (24) || aead_ciphertext`.
pub fn seal(recipient_enc_pk: &X25519PublicKey, plaintext: &[u8]) -> Vec<u8> {
    let mut ephemeral_seed = [0u8; 32];
    OsRng.fill_bytes(&mut ephemeral_seed);
    let ephemeral_secret = X25519Secret::from(ephemeral_seed);
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(recipient_enc_pk);
    let key = derive_key(shared_secret.as_bytes());
    let cipher = XChaCha20Poly1305::new(&key.into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("XChaCha20-Poly1305 encryption of a bounded plaintext cannot fail");

    let mut out = Vec::with_capacity(EPHEMERAL_PK_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

/// Open a sealed box using the recipient's encryption secret key.
pub fn open(recipient_enc_sk: &X25519Secret, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < EPHEMERAL_PK_LEN + NONCE_LEN {
        return Err(CryptoError::DecryptFail);
    }
    let (ephemeral_pk_bytes, rest) = sealed.split_at(EPHEMERAL_PK_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let ephemeral_pk_array: [u8; 32] = ephemeral_pk_bytes
        .try_into()
        .map_err(|_| CryptoError::DecryptFail)?;
    let ephemeral_pk = X25519PublicKey::from(ephemeral_pk_array);

    let shared_secret = recipient_enc_sk.diffie_hellman(&ephemeral_pk);
    let key = derive_key(shared_secret.as_bytes());
    let cipher = XChaCha20Poly1305::new(&key.into());

    let nonce_array: [u8; NONCE_LEN] = nonce_bytes.try_into().map_err(|_| CryptoError::DecryptFail)?;
    let nonce = XNonce::from(nonce_array);

    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptFail)
}
