//! Key generation, fingerprinting, signing, and sealed-box encryption for
//! agentmail node identities. Pure functions — no I/O, no persistence.

mod error;
mod identity;
mod seal;

pub use error::CryptoError;
pub use identity::{
    decode_key, encode_key, fingerprint, generate_identity, sign, sign_pk_from_bytes,
    sign_sk_from_bytes, verify, Identity,
};
pub use seal::{open, seal};

pub use ed25519_dalek::{SigningKey, VerifyingKey};
pub use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519Secret};
