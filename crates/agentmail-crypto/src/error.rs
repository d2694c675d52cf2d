/// Crypto-layer errors. Never retried by callers — a bad signature or a
/// failed decryption is a property of the message, not the network.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    BadSig,

    #[error("invalid key: {reason}")]
    BadKey { reason: String },

    #[error("decryption failed: authentication error")]
    DecryptFail,
}
