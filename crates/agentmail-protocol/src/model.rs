use serde::{Deserialize, Serialize};

/// Where a `PeerInfo` record was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeerSource {
    Lan,
    Relay,
    Manual,
}

impl PeerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerSource::Lan => "LAN",
            PeerSource::Relay => "RELAY",
            PeerSource::Manual => "MANUAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LAN" => Some(PeerSource::Lan),
            "RELAY" => Some(PeerSource::Relay),
            "MANUAL" => Some(PeerSource::Manual),
            _ => None,
        }
    }
}

/// A peer record keyed by fingerprint. `(fp, sign_pk)` is immutable once
/// written — see `PeerConflict`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub fp: String,
    pub name: String,
    pub sign_pk: [u8; 32],
    pub enc_pk: [u8; 32],
    pub endpoint: Option<String>,
    pub last_seen: u64,
    pub source: PeerSource,
}

/// The kind of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Message,
    Task,
    Ack,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "MESSAGE",
            MessageKind::Task => "TASK",
            MessageKind::Ack => "ACK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MESSAGE" => Some(MessageKind::Message),
            "TASK" => Some(MessageKind::Task),
            "ACK" => Some(MessageKind::Ack),
            _ => None,
        }
    }
}

/// Direction of a stored message relative to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(Direction::In),
            "OUT" => Some(Direction::Out),
            _ => None,
        }
    }
}

/// Delivery status of a stored OUT message. IN messages are always
/// `Delivered` (they exist only once successfully decrypted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Delivered => "DELIVERED",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(MessageStatus::Pending),
            "DELIVERED" => Some(MessageStatus::Delivered),
            "FAILED" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

/// The delivery tier an outbox entry is (or was) attempted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Direct,
    Relay,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Direct => "DIRECT",
            Tier::Relay => "RELAY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DIRECT" => Some(Tier::Direct),
            "RELAY" => Some(Tier::Relay),
            _ => None,
        }
    }
}

/// A row in the mailbox's `messages` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub direction: Direction,
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: u64,
    pub delivered_at: Option<u64>,
    pub status: MessageStatus,
    pub attempts: u32,
    pub envelope_blob: Vec<u8>,
    /// Dedup key components, set only for IN messages:
    /// `insert_inbound` is idempotent on `(sender_fp, nonce)`.
    pub sender_fp: Option<String>,
    pub nonce: Option<u128>,
}

/// A row in the mailbox's `outbox` table. Every non-DELIVERED OUT
/// `StoredMessage` has exactly one of these; it is removed on terminal
/// outcome (DELIVERED or FAILED).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub message_id: String,
    pub envelope: Vec<u8>,
    pub target_fp: String,
    pub next_try_at: u64,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub tier: Tier,
}
