use agentmail_protocol::{AgentmailError, PeerConflict};

/// Mailbox-layer errors. `Conflict` is identity pinning (see
/// `upsert_peer`); `Corrupt`/`Full` are the two `MailboxError` kinds
/// named by the delivery spec; `Db` wraps the underlying sqlite driver.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error(transparent)]
    Conflict(#[from] PeerConflict),

    #[error("mailbox store corrupt: {0}")]
    Corrupt(String),

    #[error("mailbox store full")]
    Full,

    #[error("sqlite error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl From<MailboxError> for AgentmailError {
    fn from(e: MailboxError) -> Self {
        match e {
            MailboxError::Conflict(c) => AgentmailError::PeerConflict(c),
            other => AgentmailError::Mailbox(other.to_string()),
        }
    }
}
