use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use agentmail_protocol::{
    Direction, MessageKind, MessageStatus, OutboxEntry, PeerConflict, PeerInfo, PeerSource,
    StoredMessage, Tier,
};

use crate::error::MailboxError;
use crate::schema::SCHEMA;

/// The durable `messages` / `peers` / `outbox` store. All state-changing
/// operations are transactions; reads and writes share one connection
/// behind a mutex with short critical sections (SPEC_FULL.md §5).
pub struct Mailbox {
    conn: Mutex<Connection>,
}

impl Mailbox {
    pub fn open(path: &Path) -> Result<Self, MailboxError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, MailboxError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or merge a peer record. Rejects any update that would
    /// change `sign_pk` for an existing fingerprint, or that would pin a
    /// name already recorded under a different fingerprint (both surface
    /// as `PeerConflict` — the latter is the TOFU violation spec.md §9
    /// calls `IdentityConflict`: a name resolving to a second identity).
    /// Otherwise merges, preferring a non-null endpoint and bumping
    /// `last_seen`.
    pub fn upsert_peer(&self, peer: PeerInfo) -> Result<PeerInfo, MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let tx = conn.unchecked_transaction()?;

        let name_conflict: Option<String> = tx
            .query_row(
                "SELECT fp FROM peers WHERE name = ?1 AND fp != ?2",
                params![peer.name, peer.fp],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(pinned_fp) = name_conflict {
            return Err(MailboxError::Conflict(PeerConflict { fp: pinned_fp }));
        }

        let existing: Option<(String, String, Option<String>, i64)> = tx
            .query_row(
                "SELECT sign_pk, enc_pk, endpoint, last_seen FROM peers WHERE fp = ?1",
                params![peer.fp],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let new_sign_pk = agentmail_crypto::encode_key(&peer.sign_pk);
        let new_enc_pk = agentmail_crypto::encode_key(&peer.enc_pk);

        let merged = match existing {
            Some((old_sign_pk, _old_enc_pk, old_endpoint, old_last_seen)) => {
                if old_sign_pk != new_sign_pk {
                    return Err(MailboxError::Conflict(PeerConflict { fp: peer.fp }));
                }
                let endpoint = peer.endpoint.clone().or(old_endpoint);
                let last_seen = (old_last_seen as u64).max(peer.last_seen);
                PeerInfo {
                    endpoint,
                    last_seen,
                    ..peer
                }
            }
            None => peer,
        };

        tx.execute(
            "INSERT INTO peers (fp, name, sign_pk, enc_pk, endpoint, last_seen, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(fp) DO UPDATE SET
                name = excluded.name,
                endpoint = excluded.endpoint,
                last_seen = excluded.last_seen,
                source = excluded.source",
            params![
                merged.fp,
                merged.name,
                new_sign_pk,
                new_enc_pk,
                merged.endpoint,
                merged.last_seen as i64,
                merged.source.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    pub fn get_peer_by_name_or_fp(&self, key: &str) -> Result<Option<PeerInfo>, MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        conn.query_row(
            "SELECT fp, name, sign_pk, enc_pk, endpoint, last_seen, source
             FROM peers WHERE fp = ?1 OR name = ?1 LIMIT 1",
            params![key],
            row_to_peer,
        )
        .optional()
        .map_err(MailboxError::from)
    }

    pub fn purge_peer(&self, fp: &str) -> Result<(), MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        conn.execute("DELETE FROM peers WHERE fp = ?1", params![fp])?;
        Ok(())
    }

    /// Clear a peer's endpoint without touching its pinned keys (spec.md
    /// §4.4: a discovery REMOVE event retires the address, not the record
    /// — the peer may still be reachable via relay).
    pub fn clear_peer_endpoint(&self, fp: &str) -> Result<(), MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        conn.execute("UPDATE peers SET endpoint = NULL WHERE fp = ?1", params![fp])?;
        Ok(())
    }

    /// Idempotent on `(sender_fp, nonce)` — a second insert for the same
    /// pair is a no-op that returns the existing id. This is the primary
    /// inbound dedup boundary.
    pub fn insert_inbound(&self, msg: StoredMessage) -> Result<String, MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let tx = conn.unchecked_transaction()?;

        if let (Some(sender_fp), Some(nonce)) = (&msg.sender_fp, msg.nonce) {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM messages WHERE sender_fp = ?1 AND nonce = ?2",
                    params![sender_fp, nonce.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing_id) = existing {
                return Ok(existing_id);
            }
        }

        insert_message(&tx, &msg)?;
        tx.commit()?;
        Ok(msg.id)
    }

    /// Insert an OUT `StoredMessage` and its `OutboxEntry` in one
    /// transaction.
    pub fn insert_outbound(
        &self,
        msg: StoredMessage,
        entry: OutboxEntry,
    ) -> Result<(), MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let tx = conn.unchecked_transaction()?;
        insert_message(&tx, &msg)?;
        tx.execute(
            "INSERT INTO outbox (id, message_id, envelope, target_fp, next_try_at, attempts, last_error, tier)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.message_id,
                entry.envelope,
                entry.target_fp,
                entry.next_try_at as i64,
                entry.attempts,
                entry.last_error,
                entry.tier.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// PENDING -> DELIVERED. Deletes the outbox entry.
    pub fn mark_delivered(&self, id: &str, delivered_at: u64) -> Result<(), MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE messages SET status = 'DELIVERED', delivered_at = ?2 WHERE id = ?1",
            params![id, delivered_at as i64],
        )?;
        tx.execute("DELETE FROM outbox WHERE message_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// PENDING -> FAILED. Deletes the outbox entry.
    pub fn mark_failed(&self, id: &str, reason: &str) -> Result<(), MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE messages SET status = 'FAILED' WHERE id = ?1",
            params![id],
        )?;
        tracing::warn!(id, reason, "outbound message failed permanently");
        tx.execute("DELETE FROM outbox WHERE message_id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Bounded update of an outbox entry's retry state. Also bumps the
    /// parent message's `attempts` counter so the two stay consistent.
    pub fn reschedule_outbox(
        &self,
        entry_id: &str,
        next_try_at: u64,
        attempts: u32,
        last_error: &str,
    ) -> Result<(), MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE outbox SET next_try_at = ?2, attempts = ?3, last_error = ?4 WHERE id = ?1",
            params![entry_id, next_try_at as i64, attempts, last_error],
        )?;
        tx.execute(
            "UPDATE messages SET attempts = ?2
             WHERE id = (SELECT message_id FROM outbox WHERE id = ?1)",
            params![entry_id, attempts],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Due outbox entries ordered by `(target_fp, next_try_at)` so the
    /// caller can process each target's entries serially within a scan —
    /// this is what preserves per-recipient ordering.
    pub fn list_outbox_due(&self, now: u64, limit: usize) -> Result<Vec<OutboxEntry>, MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, message_id, envelope, target_fp, next_try_at, attempts, last_error, tier
             FROM outbox
             WHERE next_try_at <= ?1
             ORDER BY target_fp, next_try_at
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![now as i64, limit as i64], row_to_outbox_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// IN messages ordered by id (ULIDs sort lexicographically by
    /// creation time), paginated by an opaque id cursor.
    pub fn inbox(&self, cursor: Option<&str>, limit: usize) -> Result<Vec<StoredMessage>, MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, direction, from_addr, to_addr, subject, body, kind, created_at,
                    delivered_at, status, attempts, envelope_blob, sender_fp, nonce
             FROM messages
             WHERE direction = 'IN' AND id > ?1
             ORDER BY id
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![cursor.unwrap_or(""), limit as i64], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_message(&self, id: &str) -> Result<Option<StoredMessage>, MailboxError> {
        let conn = self.conn.lock().expect("mailbox mutex poisoned");
        conn.query_row(
            "SELECT id, direction, from_addr, to_addr, subject, body, kind, created_at,
                    delivered_at, status, attempts, envelope_blob, sender_fp, nonce
             FROM messages WHERE id = ?1",
            params![id],
            row_to_message,
        )
        .optional()
        .map_err(MailboxError::from)
    }
}

fn insert_message(tx: &rusqlite::Transaction<'_>, msg: &StoredMessage) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO messages
            (id, direction, from_addr, to_addr, subject, body, kind, created_at,
             delivered_at, status, attempts, envelope_blob, sender_fp, nonce)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            msg.id,
            msg.direction.as_str(),
            msg.from_addr,
            msg.to_addr,
            msg.subject,
            msg.body,
            msg.kind.as_str(),
            msg.created_at as i64,
            msg.delivered_at.map(|v| v as i64),
            msg.status.as_str(),
            msg.attempts,
            msg.envelope_blob,
            msg.sender_fp,
            msg.nonce.map(|n| n.to_string()),
        ],
    )?;
    Ok(())
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<PeerInfo> {
    let sign_pk: String = row.get(2)?;
    let enc_pk: String = row.get(3)?;
    let source: String = row.get(6)?;
    Ok(PeerInfo {
        fp: row.get(0)?,
        name: row.get(1)?,
        sign_pk: decode_key_col(&sign_pk)?,
        enc_pk: decode_key_col(&enc_pk)?,
        endpoint: row.get(4)?,
        last_seen: row.get::<_, i64>(5)? as u64,
        source: PeerSource::parse(&source).unwrap_or(PeerSource::Manual),
    })
}

fn decode_key_col(s: &str) -> rusqlite::Result<[u8; 32]> {
    agentmail_crypto::decode_key(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            s.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn row_to_outbox_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let tier: String = row.get(7)?;
    Ok(OutboxEntry {
        id: row.get(0)?,
        message_id: row.get(1)?,
        envelope: row.get(2)?,
        target_fp: row.get(3)?,
        next_try_at: row.get::<_, i64>(4)? as u64,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        tier: Tier::parse(&tier).unwrap_or(Tier::Direct),
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let direction: String = row.get(1)?;
    let kind: String = row.get(6)?;
    let status: String = row.get(9)?;
    let nonce: Option<String> = row.get(13)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        direction: Direction::parse(&direction).unwrap_or(Direction::In),
        from_addr: row.get(2)?,
        to_addr: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        kind: MessageKind::parse(&kind).unwrap_or(MessageKind::Message),
        created_at: row.get::<_, i64>(7)? as u64,
        delivered_at: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
        status: MessageStatus::parse(&status).unwrap_or(MessageStatus::Pending),
        attempts: row.get(10)?,
        envelope_blob: row.get(11)?,
        sender_fp: row.get(12)?,
        nonce: nonce.and_then(|n| n.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(fp: &str, sign_pk: [u8; 32]) -> PeerInfo {
        PeerInfo {
            fp: fp.to_string(),
            name: "bob".to_string(),
            sign_pk,
            enc_pk: [2u8; 32],
            endpoint: Some("127.0.0.1:9000".to_string()),
            last_seen: 100,
            source: PeerSource::Lan,
        }
    }

    fn message(id: &str, sender_fp: Option<&str>, nonce: Option<u128>) -> StoredMessage {
        StoredMessage {
            id: id.to_string(),
            direction: Direction::In,
            from_addr: "alice@alice.local".to_string(),
            to_addr: "bob@bob.local".to_string(),
            subject: "hi".to_string(),
            body: "ping".to_string(),
            kind: MessageKind::Message,
            created_at: 1,
            delivered_at: None,
            status: MessageStatus::Delivered,
            attempts: 0,
            envelope_blob: vec![1, 2, 3],
            sender_fp: sender_fp.map(|s| s.to_string()),
            nonce,
        }
    }

    #[test]
    fn upsert_peer_inserts_then_updates_endpoint() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.upsert_peer(peer("fp1", [1u8; 32])).unwrap();
        let mut updated = peer("fp1", [1u8; 32]);
        updated.endpoint = Some("10.0.0.5:7000".to_string());
        updated.last_seen = 200;
        let merged = mb.upsert_peer(updated).unwrap();
        assert_eq!(merged.endpoint.as_deref(), Some("10.0.0.5:7000"));
        assert_eq!(merged.last_seen, 200);
    }

    #[test]
    fn upsert_peer_rejects_key_change() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.upsert_peer(peer("fp1", [1u8; 32])).unwrap();
        let conflicting = peer("fp1", [9u8; 32]);
        let err = mb.upsert_peer(conflicting).unwrap_err();
        assert!(matches!(err, MailboxError::Conflict(_)));

        let stored = mb.get_peer_by_name_or_fp("fp1").unwrap().unwrap();
        assert_eq!(stored.sign_pk, [1u8; 32]);
    }

    #[test]
    fn upsert_peer_rejects_a_second_fingerprint_under_the_same_name() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.upsert_peer(peer("fp1", [1u8; 32])).unwrap();
        let impostor = peer("fp2", [9u8; 32]);
        let err = mb.upsert_peer(impostor).unwrap_err();
        assert!(matches!(err, MailboxError::Conflict(_)));

        assert!(mb.get_peer_by_name_or_fp("fp2").unwrap().is_none());
        let stored = mb.get_peer_by_name_or_fp("bob").unwrap().unwrap();
        assert_eq!(stored.fp, "fp1");
    }

    #[test]
    fn upsert_peer_keeps_endpoint_when_new_is_null() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.upsert_peer(peer("fp1", [1u8; 32])).unwrap();
        let mut no_endpoint = peer("fp1", [1u8; 32]);
        no_endpoint.endpoint = None;
        let merged = mb.upsert_peer(no_endpoint).unwrap();
        assert_eq!(merged.endpoint.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn clear_peer_endpoint_retains_keys() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.upsert_peer(peer("fp1", [1u8; 32])).unwrap();
        mb.clear_peer_endpoint("fp1").unwrap();
        let stored = mb.get_peer_by_name_or_fp("fp1").unwrap().unwrap();
        assert_eq!(stored.endpoint, None);
        assert_eq!(stored.sign_pk, [1u8; 32]);
    }

    #[test]
    fn get_peer_by_name_or_fp_matches_either() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.upsert_peer(peer("fp1", [1u8; 32])).unwrap();
        assert!(mb.get_peer_by_name_or_fp("fp1").unwrap().is_some());
        assert!(mb.get_peer_by_name_or_fp("bob").unwrap().is_some());
        assert!(mb.get_peer_by_name_or_fp("nobody").unwrap().is_none());
    }

    #[test]
    fn insert_inbound_is_idempotent_on_sender_and_nonce() {
        let mb = Mailbox::open_in_memory().unwrap();
        let msg = message("01AAA", Some("senderfp"), Some(42));
        let id1 = mb.insert_inbound(msg.clone()).unwrap();

        let mut dup = message("01BBB", Some("senderfp"), Some(42));
        dup.body = "a different body".to_string();
        let id2 = mb.insert_inbound(dup).unwrap();

        assert_eq!(id1, id2);
        let inbox = mb.inbox(None, 10).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].body, "ping");
    }

    #[test]
    fn insert_inbound_without_dedup_key_always_inserts() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.insert_inbound(message("01AAA", None, None)).unwrap();
        mb.insert_inbound(message("01BBB", None, None)).unwrap();
        assert_eq!(mb.inbox(None, 10).unwrap().len(), 2);
    }

    #[test]
    fn outbox_closure_holds_across_lifecycle() {
        let mb = Mailbox::open_in_memory().unwrap();
        let mut msg = message("01OUT", None, None);
        msg.direction = Direction::Out;
        msg.status = MessageStatus::Pending;
        let entry = OutboxEntry {
            id: "entry1".to_string(),
            message_id: "01OUT".to_string(),
            envelope: vec![1, 2, 3],
            target_fp: "targetfp".to_string(),
            next_try_at: 0,
            attempts: 0,
            last_error: None,
            tier: Tier::Direct,
        };
        mb.insert_outbound(msg, entry).unwrap();
        assert_eq!(mb.list_outbox_due(1_000, 10).unwrap().len(), 1);

        mb.mark_delivered("01OUT", 500).unwrap();
        assert_eq!(mb.list_outbox_due(1_000, 10).unwrap().len(), 0);
        let stored = mb.get_message("01OUT").unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Delivered);
        assert_eq!(stored.delivered_at, Some(500));
    }

    #[test]
    fn mark_failed_removes_outbox_entry() {
        let mb = Mailbox::open_in_memory().unwrap();
        let mut msg = message("01OUT", None, None);
        msg.direction = Direction::Out;
        msg.status = MessageStatus::Pending;
        let entry = OutboxEntry {
            id: "entry1".to_string(),
            message_id: "01OUT".to_string(),
            envelope: vec![],
            target_fp: "targetfp".to_string(),
            next_try_at: 0,
            attempts: 20,
            last_error: Some("timeout".to_string()),
            tier: Tier::Relay,
        };
        mb.insert_outbound(msg, entry).unwrap();
        mb.mark_failed("01OUT", "attempt ceiling reached").unwrap();
        assert_eq!(mb.list_outbox_due(1_000, 10).unwrap().len(), 0);
        let stored = mb.get_message("01OUT").unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
    }

    #[test]
    fn reschedule_outbox_bumps_attempts_on_both_rows() {
        let mb = Mailbox::open_in_memory().unwrap();
        let mut msg = message("01OUT", None, None);
        msg.direction = Direction::Out;
        msg.status = MessageStatus::Pending;
        let entry = OutboxEntry {
            id: "entry1".to_string(),
            message_id: "01OUT".to_string(),
            envelope: vec![],
            target_fp: "targetfp".to_string(),
            next_try_at: 0,
            attempts: 0,
            last_error: None,
            tier: Tier::Direct,
        };
        mb.insert_outbound(msg, entry).unwrap();
        mb.reschedule_outbox("entry1", 5_000, 1, "timed out").unwrap();

        let due = mb.list_outbox_due(10_000, 10).unwrap();
        assert_eq!(due[0].attempts, 1);
        assert_eq!(due[0].next_try_at, 5_000);
        let stored = mb.get_message("01OUT").unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[test]
    fn list_outbox_due_orders_by_target_then_time() {
        let mb = Mailbox::open_in_memory().unwrap();
        for (id, target, next) in [("m1", "b", 20u64), ("m2", "a", 10), ("m3", "a", 5)] {
            let mut msg = message(id, None, None);
            msg.direction = Direction::Out;
            msg.status = MessageStatus::Pending;
            let entry = OutboxEntry {
                id: format!("entry-{id}"),
                message_id: id.to_string(),
                envelope: vec![],
                target_fp: target.to_string(),
                next_try_at: next,
                attempts: 0,
                last_error: None,
                tier: Tier::Direct,
            };
            mb.insert_outbound(msg, entry).unwrap();
        }
        let due = mb.list_outbox_due(1_000, 10).unwrap();
        let order: Vec<(&str, u64)> = due.iter().map(|e| (e.target_fp.as_str(), e.next_try_at)).collect();
        assert_eq!(order, vec![("a", 5), ("a", 10), ("b", 20)]);
    }

    #[test]
    fn inbox_paginates_by_cursor() {
        let mb = Mailbox::open_in_memory().unwrap();
        mb.insert_inbound(message("01AAA", None, None)).unwrap();
        mb.insert_inbound(message("01BBB", None, None)).unwrap();
        mb.insert_inbound(message("01CCC", None, None)).unwrap();

        let first_page = mb.inbox(None, 2).unwrap();
        assert_eq!(first_page.len(), 2);
        let last_id = &first_page.last().unwrap().id;
        let second_page = mb.inbox(Some(last_id), 2).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, "01CCC");
    }
}
