use std::sync::Arc;

use arqonbus_history::HistoryStore;
use arqonbus_protocol::Principal;
use arqonbus_registry::Registry;
use arqonbus_rooms::RoomsStore;
use arqonbus_router::Router;

/// Everything a command handler needs: the originating request, the caller's
/// authenticated identity, and the shared component state it may read or
/// mutate under their respective locks (§4.7).
pub struct CommandContext {
    pub request_id: String,
    pub command: String,
    pub args: serde_json::Value,
    pub principal: Principal,
    pub registry: Arc<Registry>,
    pub rooms: Arc<RoomsStore>,
    pub history: Arc<HistoryStore>,
}

impl CommandContext {
    pub fn tenant_id(&self) -> &str {
        &self.principal.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.principal.client_id
    }

    /// Broadcast a lifecycle event envelope to a channel's members, used by
    /// join/leave/create/delete to notify affected subscribers (§4.7).
    ///
    /// Routed through [`Router::route`], which resolves the channel's
    /// current membership itself — callers never enumerate recipients.
    pub fn emit_lifecycle_event(&self, room: &str, channel: &str, event: &str, detail: serde_json::Value) {
        let envelope = arqonbus_protocol::Envelope {
            id: format!("{}:{event}", self.request_id),
            r#type: arqonbus_protocol::EnvelopeType::Event,
            version: arqonbus_protocol::PROTOCOL_VERSION.to_string(),
            timestamp: arqonbus_common::time::now_ms(),
            from_client: self.client_id().to_string(),
            to_client: None,
            room: Some(room.to_string()),
            channel: Some(channel.to_string()),
            command: None,
            args: None,
            payload: Some(serde_json::json!({
                "event": event,
                "room": room,
                "channel": channel,
                "client_id": self.client_id(),
                "detail": detail,
            })),
            metadata: None,
            correlation_id: Some(self.request_id.clone()),
            tenant_id: Some(self.tenant_id().to_string()),
        };
        let _ = Router::route(envelope, &self.registry, &self.rooms);
    }
}
