//! The relay's in-memory store-and-forward queue (spec.md §4.7): envelopes
//! keyed by `recipient_fp`, drained in one shot on pickup. Authoritative
//! only while the process lives — restart loses everything, senders
//! re-deposit.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use agentmail_protocol::{MessageEnvelope, StatsResponse};

/// Default per-recipient cap (spec.md §4.7: "1000 envelopes or 10 MiB total").
pub const MAX_ENTRIES_PER_RECIPIENT: usize = 1000;
pub const MAX_BYTES_PER_RECIPIENT: usize = 10 * 1024 * 1024;

struct Queued {
    envelope: MessageEnvelope,
    size: usize,
}

#[derive(Default)]
struct Bucket {
    entries: VecDeque<Queued>,
    bytes: usize,
}

pub struct EnvelopeQueue {
    buckets: Mutex<HashMap<String, Bucket>>,
    max_entries: usize,
    max_bytes: usize,
}

/// A single envelope is larger than this recipient's entire allotment —
/// it cannot be stored even after evicting everything else queued.
pub struct EnvelopeTooLarge;

impl EnvelopeQueue {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_entries,
            max_bytes,
        }
    }

    /// Append `envelope` to its recipient's queue, evicting the oldest
    /// entries first if the per-recipient cap is exceeded (spec.md §4.7).
    /// Fails only when the envelope alone exceeds the byte cap.
    pub fn deposit(&self, envelope: MessageEnvelope) -> Result<(), EnvelopeTooLarge> {
        let size = serde_json::to_vec(&envelope).map(|v| v.len()).unwrap_or(0);
        if size > self.max_bytes {
            return Err(EnvelopeTooLarge);
        }

        let mut buckets = self.buckets.lock().expect("queue mutex poisoned");
        let bucket = buckets.entry(envelope.recipient_fp.clone()).or_default();
        bucket.bytes += size;
        bucket.entries.push_back(Queued { envelope, size });

        while bucket.entries.len() > self.max_entries || bucket.bytes > self.max_bytes {
            if let Some(evicted) = bucket.entries.pop_front() {
                bucket.bytes -= evicted.size;
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Return and remove every envelope queued for `fp` (spec.md: "drains
    /// the queue in one transaction").
    pub fn pickup(&self, fp: &str) -> Vec<MessageEnvelope> {
        let mut buckets = self.buckets.lock().expect("queue mutex poisoned");
        match buckets.remove(fp) {
            Some(bucket) => bucket.entries.into_iter().map(|q| q.envelope).collect(),
            None => Vec::new(),
        }
    }

    pub fn stats(&self) -> StatsResponse {
        let buckets = self.buckets.lock().expect("queue mutex poisoned");
        let mut messages_held = 0u64;
        let mut total_bytes = 0u64;
        for bucket in buckets.values() {
            messages_held += bucket.entries.len() as u64;
            total_bytes += bucket.bytes as u64;
        }
        StatsResponse { messages_held, total_bytes }
    }
}
