use arqonbus_protocol::Envelope;
use arqonbus_registry::Registry;
use arqonbus_rooms::RoomsStore;

use crate::error::{Error, Result};

/// Result of fanning an envelope out to its resolved recipients.
#[derive(Debug, Default)]
pub struct DeliveryOutcome {
    pub recipients: usize,
    pub delivered: usize,
    pub saturated: Vec<String>,
    pub offline: Vec<String>,
}

/// Resolves and delivers envelopes given the live registry and rooms store.
/// Stateless: holds no data of its own, so it can be shared freely across
/// connection tasks.
pub struct Router;

impl Router {
    /// Resolve the recipient set for an already-target-validated envelope
    /// (§4.1 rule 5 guarantees exactly one of `to_client`/`channel`/`room`
    /// is set on a `Message` envelope). `Error::NoTarget` should therefore
    /// be unreachable past validation; callers still map it to a
    /// client-facing error rather than discarding it, as defense in depth.
    pub fn resolve_recipients(envelope: &Envelope, rooms: &RoomsStore) -> Result<Vec<String>> {
        let tenant_id = envelope.tenant_id.as_deref().unwrap_or_default();

        let mut recipients = if let Some(to_client) = &envelope.to_client {
            vec![to_client.clone()]
        } else if let (Some(room), Some(channel)) = (&envelope.room, &envelope.channel) {
            rooms.channel_members(tenant_id, room, channel).unwrap_or_default()
        } else if let Some(room) = &envelope.room {
            rooms.room_members(tenant_id, room)
        } else {
            return Err(Error::NoTarget);
        };

        if !envelope.wants_echo() {
            recipients.retain(|r| r != &envelope.from_client);
        }
        Ok(recipients)
    }

    /// Resolve recipients, then attempt a non-blocking delivery to each.
    /// A saturated or offline recipient never fails the whole fan-out; each
    /// recipient is independent (§7: at-most-once, per-recipient ordering).
    pub fn route(envelope: Envelope, registry: &Registry, rooms: &RoomsStore) -> Result<DeliveryOutcome> {
        let tenant_id = envelope.tenant_id.clone().unwrap_or_default();
        let recipients = Self::resolve_recipients(&envelope, rooms)?;
        let mut outcome = DeliveryOutcome {
            recipients: recipients.len(),
            ..Default::default()
        };

        for client_id in recipients {
            match registry.try_deliver(&tenant_id, &client_id, envelope.clone()) {
                Ok(true) => outcome.delivered += 1,
                Ok(false) => outcome.offline.push(client_id),
                Err(_) => outcome.saturated.push(client_id),
            }
        }

        metrics::counter!("arqonbus_router_delivered_total").increment(outcome.delivered as u64);
        metrics::counter!("arqonbus_router_saturated_total").increment(outcome.saturated.len() as u64);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use arqonbus_config::schema::DuplicateIdentityPolicy;
    use arqonbus_protocol::EnvelopeType;

    use super::*;

    fn envelope(from: &str, to: Option<&str>, room: Option<&str>, channel: Option<&str>) -> Envelope {
        Envelope {
            id: "m1".into(),
            r#type: EnvelopeType::Message,
            version: "1".into(),
            timestamp: 0,
            from_client: from.into(),
            to_client: to.map(String::from),
            room: room.map(String::from),
            channel: channel.map(String::from),
            command: None,
            args: None,
            payload: Some(serde_json::json!({"text": "hi"})),
            metadata: None,
            correlation_id: None,
            tenant_id: Some("t1".into()),
        }
    }

    #[test]
    fn direct_message_targets_single_recipient() {
        let rooms = RoomsStore::new(true, Vec::new());
        let env = envelope("alice", Some("bob"), None, None);
        let recipients = Router::resolve_recipients(&env, &rooms).unwrap();
        assert_eq!(recipients, vec!["bob".to_string()]);
    }

    #[test]
    fn channel_target_excludes_sender_by_default() {
        let rooms = RoomsStore::new(true, Vec::new());
        rooms.join_channel("t1", "lobby", "general", "alice").unwrap();
        rooms.join_channel("t1", "lobby", "general", "bob").unwrap();
        let env = envelope("alice", None, Some("lobby"), Some("general"));
        let recipients = Router::resolve_recipients(&env, &rooms).unwrap();
        assert_eq!(recipients, vec!["bob".to_string()]);
    }

    #[test]
    fn echo_opt_in_keeps_sender() {
        let rooms = RoomsStore::new(true, Vec::new());
        rooms.join_channel("t1", "lobby", "general", "alice").unwrap();
        let mut env = envelope("alice", None, Some("lobby"), Some("general"));
        let mut m = serde_json::Map::new();
        m.insert("echo".into(), serde_json::Value::Bool(true));
        env.metadata = Some(m);
        let recipients = Router::resolve_recipients(&env, &rooms).unwrap();
        assert_eq!(recipients, vec!["alice".to_string()]);
    }

    #[test]
    fn room_only_target_is_union_of_channels() {
        let rooms = RoomsStore::new(true, Vec::new());
        rooms.join_channel("t1", "lobby", "general", "bob").unwrap();
        rooms.join_channel("t1", "lobby", "random", "carol").unwrap();
        let env = envelope("alice", None, Some("lobby"), None);
        let mut recipients = Router::resolve_recipients(&env, &rooms).unwrap();
        recipients.sort();
        assert_eq!(recipients, vec!["bob".to_string(), "carol".to_string()]);
    }

    #[test]
    fn route_reports_offline_recipients() {
        let rooms = RoomsStore::new(true, Vec::new());
        let registry = Registry::new(8, DuplicateIdentityPolicy::Supersede);
        let env = envelope("alice", Some("ghost"), None, None);
        let outcome = Router::route(env, &registry, &rooms).unwrap();
        assert_eq!(outcome.recipients, 1);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.offline, vec!["ghost".to_string()]);
    }
}
