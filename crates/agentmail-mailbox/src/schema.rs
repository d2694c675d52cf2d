pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS peers (
    fp TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    sign_pk TEXT NOT NULL,
    enc_pk TEXT NOT NULL,
    endpoint TEXT,
    last_seen INTEGER NOT NULL,
    source TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    direction TEXT NOT NULL,
    from_addr TEXT NOT NULL,
    to_addr TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    delivered_at INTEGER,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    envelope_blob BLOB NOT NULL,
    sender_fp TEXT,
    nonce TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedup
    ON messages(sender_fp, nonce)
    WHERE sender_fp IS NOT NULL AND nonce IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_messages_inbox
    ON messages(direction, id);

CREATE TABLE IF NOT EXISTS outbox (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    envelope BLOB NOT NULL,
    target_fp TEXT NOT NULL,
    next_try_at INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    tier TEXT NOT NULL,
    FOREIGN KEY(message_id) REFERENCES messages(id)
);

CREATE INDEX IF NOT EXISTS idx_outbox_scan
    ON outbox(target_fp, next_try_at);
"#;
