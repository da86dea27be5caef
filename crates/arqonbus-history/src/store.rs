use std::sync::atomic::{AtomicBool, Ordering};

use arqonbus_config::schema::HistoryConfig;

use crate::entry::{HistoryEntry, HistoryKey};
use crate::error::Result;
use crate::ring::HistoryRing;

#[cfg(feature = "durable-sqlite")]
use crate::durable::SqliteHistoryStore;

/// The history/persistence layer (§4.6): an in-memory ring always backs
/// appends, with an optional durable backend mirrored on top. If the
/// durable backend becomes unreachable, the store degrades to
/// in-memory-only and flips its health signal — reads always serve from
/// the ring, so degraded mode never surfaces a read error, only a stale
/// durable copy until the backend recovers.
pub struct HistoryStore {
    ring: HistoryRing,
    #[cfg(feature = "durable-sqlite")]
    durable: Option<SqliteHistoryStore>,
    durable_degraded: AtomicBool,
    default_read_limit: usize,
    max_read_limit: usize,
}

impl HistoryStore {
    #[must_use]
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            ring: HistoryRing::new(config.ring_capacity, config.ring_overflow_policy),
            #[cfg(feature = "durable-sqlite")]
            durable: None,
            durable_degraded: AtomicBool::new(false),
            default_read_limit: config.default_read_limit,
            max_read_limit: config.max_read_limit,
        }
    }

    #[cfg(feature = "durable-sqlite")]
    #[must_use]
    pub fn with_durable(mut self, durable: SqliteHistoryStore) -> Self {
        self.durable = Some(durable);
        self
    }

    /// True if the durable backend is configured but currently unreachable
    /// (§4.6 "surfaces the backend outage via the component health signal").
    pub fn is_durable_degraded(&self) -> bool {
        self.durable_degraded.load(Ordering::Relaxed)
    }

    /// Append to the in-memory ring (authoritative for reads), mirroring to
    /// the durable backend when configured. A durable-write failure never
    /// fails the call or loses the in-memory copy — it only flips the
    /// degraded flag (§4.6 "no silent data loss": the caller still gets
    /// back the ring's assigned sequence number).
    pub async fn append(&self, key: &HistoryKey, envelope: arqonbus_protocol::Envelope) -> Result<u64> {
        let seq = self.ring.append(key, envelope.clone())?;

        #[cfg(feature = "durable-sqlite")]
        if let Some(durable) = &self.durable {
            match durable.append(key, &envelope).await {
                Ok(_) => {
                    self.durable_degraded.store(false, Ordering::Relaxed);
                },
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "durable history append failed, degrading to in-memory");
                    self.durable_degraded.store(true, Ordering::Relaxed);
                    metrics::gauge!("arqonbus_history_durable_degraded").set(1.0);
                },
            }
        }

        Ok(seq)
    }

    /// Bounded read, always served from the in-memory ring (§4.6: "reads
    /// continue to serve in-memory entries only" on durable outage).
    pub fn get(&self, key: &HistoryKey, since: Option<u64>, until: Option<u64>, limit: Option<usize>) -> Vec<HistoryEntry> {
        let limit = limit.unwrap_or(self.default_read_limit).min(self.max_read_limit);
        self.ring.get(key, since, until, limit)
    }

    pub fn replay(
        &self,
        key: &HistoryKey,
        from_ts: u64,
        to_ts: u64,
        strict_sequence: bool,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(self.default_read_limit).min(self.max_read_limit);
        self.ring.replay(key, from_ts, to_ts, strict_sequence, limit)
    }

    /// Admin-only global read across every `(room, channel)` under a
    /// tenant, used when `history.get`/`history.replay` omit a room scope
    /// (§4.6 "global history access is admin-only"). Applies the same
    /// bounded-limit rule per key, not to the aggregate.
    pub fn get_all_for_tenant(
        &self,
        tenant_id: &str,
        since: Option<u64>,
        until: Option<u64>,
        limit: Option<usize>,
    ) -> Vec<(HistoryKey, Vec<HistoryEntry>)> {
        self.ring
            .keys_for_tenant(tenant_id)
            .into_iter()
            .map(|key| {
                let entries = self.get(&key, since, until, limit);
                (key, entries)
            })
            .filter(|(_, entries)| !entries.is_empty())
            .collect()
    }

    /// Admin-only global replay across every `(room, channel)` under a
    /// tenant. A `SEQUENCE_GAP` in any one key's window fails the whole
    /// call, consistent with `replay`'s per-key strictness guarantee.
    pub fn replay_all_for_tenant(
        &self,
        tenant_id: &str,
        from_ts: u64,
        to_ts: u64,
        strict_sequence: bool,
        limit: Option<usize>,
    ) -> Result<Vec<(HistoryKey, Vec<HistoryEntry>)>> {
        let mut out = Vec::new();
        for key in self.ring.keys_for_tenant(tenant_id) {
            let entries = self.replay(&key, from_ts, to_ts, strict_sequence, limit)?;
            if !entries.is_empty() {
                out.push((key, entries));
            }
        }
        Ok(out)
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

    #[tokio::test]
    async fn append_then_get_round_trips() {
        let store = HistoryStore::new(&HistoryConfig::default());
        let key = HistoryKey::new("t1", "ops", "events");
        store.append(&key, envelope("m1")).await.unwrap();
        let entries = store.get(&key, None, None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].envelope.id, "m1");
    }

    #[tokio::test]
    async fn read_limit_is_capped_by_config() {
        let mut config = HistoryConfig::default();
        config.max_read_limit = 2;
        config.default_read_limit = 2;
        let store = HistoryStore::new(&config);
        let key = HistoryKey::new("t1", "ops", "events");
        for i in 0..5 {
            store.append(&key, envelope(&format!("m{i}"))).await.unwrap();
        }
        let entries = store.get(&key, None, None, Some(100));
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn not_degraded_without_durable_backend() {
        let store = HistoryStore::new(&HistoryConfig::default());
        assert!(!store.is_durable_degraded());
    }

    #[tokio::test]
    async fn get_all_for_tenant_spans_every_channel_but_not_other_tenants() {
        let store = HistoryStore::new(&HistoryConfig::default());
        store.append(&HistoryKey::new("t1", "ops", "events"), envelope("m1")).await.unwrap();
        store.append(&HistoryKey::new("t1", "ops", "alerts"), envelope("m2")).await.unwrap();
        store.append(&HistoryKey::new("t2", "ops", "events"), envelope("m3")).await.unwrap();

        let all = store.get_all_for_tenant("t1", None, None, None);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|(k, _)| k.tenant_id == "t1"));
    }
}
