/// Identity pinning violation: a peer record already exists for a
/// fingerprint with a different signing key. Never silently overwritten.
#[derive(Debug, Clone, thiserror::Error)]
#[error("peer conflict for fingerprint {fp}: recorded key does not match")]
pub struct PeerConflict {
    pub fp: String,
}

/// Resolution of `name` failed against both the local mailbox and the relay.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown recipient: {0}")]
pub struct UnknownRecipient(pub String);

/// Failures talking to a peer directly. Retried by the router via the outbox.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("timed out contacting peer")]
    Timeout,
    #[error("connection refused")]
    Refused,
    #[error("peer returned server error: {status}")]
    Http5xx { status: u16 },
    #[error("transport failure: {reason}")]
    Other { reason: String },
}

/// Failures talking to the configured relay. 5xx is retried, 4xx (except
/// 409, a registry conflict handled explicitly) is fatal for the attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("relay rejected request: {status}")]
    Http4xx { status: u16 },
    #[error("relay server error: {status}")]
    Http5xx { status: u16 },
    #[error("relay request failed: {reason}")]
    Other { reason: String },
}

/// Top-level error composing every leaf error kind, for call sites that
/// need one error type (the router, the HTTP handlers).
#[derive(Debug, thiserror::Error)]
pub enum AgentmailError {
    #[error(transparent)]
    Crypto(#[from] agentmail_crypto::CryptoError),

    #[error(transparent)]
    PeerConflict(#[from] PeerConflict),

    #[error(transparent)]
    UnknownRecipient(#[from] UnknownRecipient),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("mailbox error: {0}")]
    Mailbox(String),

    #[error("router error: {0}")]
    Router(String),

    #[error("invalid envelope: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("unknown sender: {0}")]
    UnknownSender(String),
}
