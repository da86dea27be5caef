use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use arqonbus_config::schema::RingOverflowPolicy;
use dashmap::DashMap;

use crate::entry::{HistoryEntry, HistoryKey};
use crate::error::{Error, Result};

struct KeyRing {
    entries: Mutex<VecDeque<HistoryEntry>>,
    next_seq: AtomicU64,
}

impl KeyRing {
    fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(1),
        }
    }
}

/// Bounded in-memory ring, one per `(tenant, room, channel)` (§4.6).
///
/// `sequence_number` assignment is atomic per key and strictly monotonic
/// regardless of overflow policy — a dropped entry still consumed its
/// sequence number, so replay gap detection stays meaningful.
pub struct HistoryRing {
    rings: DashMap<HistoryKey, KeyRing>,
    capacity: usize,
    overflow_policy: RingOverflowPolicy,
}

impl HistoryRing {
    #[must_use]
    pub fn new(capacity: usize, overflow_policy: RingOverflowPolicy) -> Self {
        Self {
            rings: DashMap::new(),
            capacity,
            overflow_policy,
        }
    }

    pub fn append(&self, key: &HistoryKey, envelope: arqonbus_protocol::Envelope) -> Result<u64> {
        let ring = self.rings.entry(key.clone()).or_insert_with(KeyRing::new);
        let seq = ring.next_seq.fetch_add(1, Ordering::SeqCst);

        let mut entries = ring.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.capacity {
            match self.overflow_policy {
                RingOverflowPolicy::DropOldest => {
                    entries.pop_front();
                },
                RingOverflowPolicy::DropNewest => {
                    return Err(Error::Overflow {
                        key: key.to_string(),
                        capacity: self.capacity,
                    });
                },
            }
        }
        entries.push_back(HistoryEntry {
            envelope,
            stored_at: arqonbus_common::time::now_ms(),
            sequence_number: seq,
            storage_metadata: Some(serde_json::json!({ "backend": "memory" })),
        });
        metrics::gauge!("arqonbus_history_ring_len", "key" => key.to_string()).set(entries.len() as f64);
        Ok(seq)
    }

    pub fn get(&self, key: &HistoryKey, since: Option<u64>, until: Option<u64>, limit: usize) -> Vec<HistoryEntry> {
        let Some(ring) = self.rings.get(key) else {
            return Vec::new();
        };
        let entries = ring.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| since.is_none_or(|s| e.sequence_number > s))
            .filter(|e| until.is_none_or(|u| e.sequence_number <= u))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn replay(
        &self,
        key: &HistoryKey,
        from_ts: u64,
        to_ts: u64,
        strict_sequence: bool,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let Some(ring) = self.rings.get(key) else {
            return Ok(Vec::new());
        };
        let entries = ring.entries.lock().unwrap_or_else(|e| e.into_inner());
        let window: Vec<HistoryEntry> = entries
            .iter()
            .filter(|e| e.stored_at >= from_ts && e.stored_at <= to_ts)
            .take(limit)
            .cloned()
            .collect();

        if strict_sequence {
            for pair in window.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                if next.sequence_number != prev.sequence_number + 1 {
                    return Err(Error::SequenceGap {
                        key: key.to_string(),
                        expected: prev.sequence_number + 1,
                        actual: next.sequence_number,
                    });
                }
            }
        }
        Ok(window)
    }

    pub fn len(&self, key: &HistoryKey) -> usize {
        self.rings
            .get(key)
            .map(|r| r.entries.lock().unwrap_or_else(|e| e.into_inner()).len())
            .unwrap_or(0)
    }

    /// Every `(room, channel)` pair with at least one ring entry under
    /// `tenant_id`, for admin-only global history queries (§4.6
    /// "global history access is admin-only").
    pub fn keys_for_tenant(&self, tenant_id: &str) -> Vec<HistoryKey> {
        self.rings
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.tenant_id == tenant_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use arqonbus_protocol::{Envelope, EnvelopeType};

    use super::*;

    fn envelope(id: &str) -> Envelope {
        Envelope {
            id: id.into(),
            r#type: EnvelopeType::Message,
            version: "1".into(),
            timestamp: 0,
            from_client: "alice".into(),
            to_client: None,
            room: Some("ops".into()),
            channel: Some("events".into()),
            command: None,
            args: None,
            payload: Some(serde_json::json!({"n": id})),
            metadata: None,
            correlation_id: None,
            tenant_id: Some("t1".into()),
        }
    }

    #[test]
    fn append_assigns_strictly_monotonic_sequence() {
        let ring = HistoryRing::new(10, RingOverflowPolicy::DropOldest);
        let key = HistoryKey::new("t1", "ops", "events");
        let s1 = ring.append(&key, envelope("m1")).unwrap();
        let s2 = ring.append(&key, envelope("m2")).unwrap();
        assert!(s2 > s1);
    }

    #[test]
    fn drop_oldest_evicts_when_full() {
        let ring = HistoryRing::new(2, RingOverflowPolicy::DropOldest);
        let key = HistoryKey::new("t1", "ops", "events");
        ring.append(&key, envelope("m1")).unwrap();
        ring.append(&key, envelope("m2")).unwrap();
        ring.append(&key, envelope("m3")).unwrap();
        assert_eq!(ring.len(&key), 2);
        let all = ring.get(&key, None, None, 10);
        assert_eq!(all[0].envelope.id, "m2");
    }

    #[test]
    fn drop_newest_rejects_when_full() {
        let ring = HistoryRing::new(1, RingOverflowPolicy::DropNewest);
        let key = HistoryKey::new("t1", "ops", "events");
        ring.append(&key, envelope("m1")).unwrap();
        let err = ring.append(&key, envelope("m2")).unwrap_err();
        assert!(matches!(err, Error::Overflow { .. }));
    }

    #[test]
    fn get_respects_since_and_limit() {
        let ring = HistoryRing::new(10, RingOverflowPolicy::DropOldest);
        let key = HistoryKey::new("t1", "ops", "events");
        for i in 0..5 {
            ring.append(&key, envelope(&format!("m{i}"))).unwrap();
        }
        let page = ring.get(&key, Some(2), None, 10);
        assert_eq!(page.len(), 3);
        assert!(page.iter().all(|e| e.sequence_number > 2));
    }

    #[test]
    fn replay_detects_sequence_gap_after_drop() {
        let ring = HistoryRing::new(2, RingOverflowPolicy::DropOldest);
        let key = HistoryKey::new("t1", "ops", "events");
        for i in 0..4 {
            ring.append(&key, envelope(&format!("m{i}"))).unwrap();
        }
        let err = ring.replay(&key, 0, u64::MAX, true, 10).unwrap_err();
        assert!(matches!(err, Error::SequenceGap { .. }));
    }

    #[test]
    fn replay_ok_without_gaps() {
        let ring = HistoryRing::new(10, RingOverflowPolicy::DropOldest);
        let key = HistoryKey::new("t1", "ops", "events");
        for i in 0..3 {
            ring.append(&key, envelope(&format!("m{i}"))).unwrap();
        }
        let entries = ring.replay(&key, 0, u64::MAX, true, 10).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn unknown_key_returns_empty() {
        let ring = HistoryRing::new(10, RingOverflowPolicy::DropOldest);
        let key = HistoryKey::new("t1", "ops", "events");
        assert!(ring.get(&key, None, None, 10).is_empty());
        assert!(ring.replay(&key, 0, u64::MAX, true, 10).unwrap().is_empty());
    }
}
