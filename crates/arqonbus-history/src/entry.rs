use arqonbus_protocol::Envelope;
use serde::{Deserialize, Serialize};

/// `(tenant, room, channel)` — the unit of monotonic sequencing (§3, §5).
///
/// Direct messages that opt into persistence are addressed under the
/// synthetic room `"_dm"` with the channel set to the two client ids sorted
/// and joined by `:` (§9 Open Question 4), so `get`/`replay` never need a
/// separate code path for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HistoryKey {
    pub tenant_id: String,
    pub room: String,
    pub channel: String,
}

impl HistoryKey {
    pub fn new(tenant_id: impl Into<String>, room: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            room: room.into(),
            channel: channel.into(),
        }
    }

    /// Synthetic key for a persisted direct message between two clients,
    /// stable regardless of who sent it.
    pub fn direct(tenant_id: impl Into<String>, client_a: &str, client_b: &str) -> Self {
        let (a, b) = if client_a <= client_b {
            (client_a, client_b)
        } else {
            (client_b, client_a)
        };
        Self::new(tenant_id, "_dm", format!("{a}:{b}"))
    }
}

impl std::fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.tenant_id, self.room, self.channel)
    }
}

/// One persisted record: `(envelope, stored_at, sequence_number,
/// storage_metadata)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub envelope: Envelope,
    pub stored_at: u64,
    pub sequence_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_metadata: Option<serde_json::Value>,
}
