//! Canonical envelope/payload model, address parsing, and the shared
//! domain types (`PeerInfo`, `StoredMessage`, `OutboxEntry`) used across
//! agentmail's mailbox, router, discovery, node, and relay crates.

pub mod address;
pub mod canonical;
pub mod clock;
pub mod envelope;
pub mod error;
pub mod model;
pub mod payload;
pub mod relay_api;

pub use address::Address;
pub use clock::{Clock, FixedClock, SystemClock};
pub use envelope::{build_envelope, verify_and_open, MessageEnvelope, PROTOCOL_VERSION};
pub use error::{AgentmailError, PeerConflict, RelayError, TransportError, UnknownRecipient};
pub use model::{Direction, MessageKind, MessageStatus, OutboxEntry, PeerInfo, PeerSource, StoredMessage, Tier};
pub use payload::MessagePayload;
pub use relay_api::{
    HealthResponse, LookupResponse, PickupResponse, RegisterRequest, SendRequest, StatsResponse,
};

/// New ULID string, used for `StoredMessage.id` and `OutboxEntry.id` —
/// crockford-base32, lexicographically sortable by creation time.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
