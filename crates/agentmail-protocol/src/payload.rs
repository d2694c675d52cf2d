use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::model::MessageKind;

/// The inner plaintext of a message — what ends up sealed inside an
/// envelope's ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: u64,
    /// 128-bit random value ensuring payload uniqueness even when every
    /// other field collides. The dedup boundary is `(sender_fp, nonce)`.
    pub nonce: u128,
}

impl MessagePayload {
    pub fn new(
        from_addr: impl Into<String>,
        to_addr: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        kind: MessageKind,
        created_at: u64,
    ) -> Self {
        let mut nonce_bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        Self {
            from_addr: from_addr.into(),
            to_addr: to_addr.into(),
            subject: subject.into(),
            body: body.into(),
            kind,
            created_at,
            nonce: u128::from_le_bytes(nonce_bytes),
        }
    }
}
