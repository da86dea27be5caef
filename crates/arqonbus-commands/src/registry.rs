use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use arqonbus_protocol::{Envelope, EnvelopeType, ErrorShape, PROTOCOL_VERSION, Role, error_codes};
use tracing::{debug, warn};

use crate::context::CommandContext;
use crate::handlers;

/// The result a command handler produces: a response `payload`, or an
/// [`ErrorShape`] the registry turns into `status=error` (§4.7).
pub type CommandResult = std::result::Result<serde_json::Value, ErrorShape>;

pub type HandlerFn =
    Box<dyn Fn(CommandContext) -> Pin<Box<dyn Future<Output = CommandResult> + Send>> + Send + Sync>;

/// The fixed, versioned command set (§4.7), canonical names only — aliases
/// resolve to these before lookup.
pub const COMMAND_NAMES: &[&str] = &[
    "status",
    "ping",
    "create_channel",
    "delete_channel",
    "join_channel",
    "leave_channel",
    "list_channels",
    "channel_info",
    "history.get",
    "history.replay",
    "help",
];

/// Resolve a command's documented alias (§4.7: `op.history.get` aliases
/// `history.get`, `op.history.replay` aliases `history.replay`) to its
/// canonical registered name.
fn canonical(command: &str) -> &str {
    match command {
        "op.history.get" => "history.get",
        "op.history.replay" => "history.replay",
        other => other,
    }
}

/// Minimum role required for a command. `None` means "reachable by any
/// authenticated role including guest"; destructive/mutating commands and
/// admin-only reads are listed explicitly.
fn min_role(command: &str) -> Option<Role> {
    match command {
        "delete_channel" => Some(Role::Admin),
        "create_channel" | "join_channel" | "leave_channel" => Some(Role::User),
        "history.get" | "history.replay" | "list_channels" | "channel_info" => Some(Role::User),
        "status" | "ping" | "help" => None,
        _ => None,
    }
}

/// Check role authorization for a command. Returns `None` if authorized.
///
/// Fine-grained checks that can't be expressed as a flat role floor (e.g.
/// `delete_channel`'s hard admin requirement) are re-asserted inside the
/// handler itself; this gate is the cheap first line of defense so an
/// unauthorized call never reaches handler logic at all.
pub fn authorize(command: &str, role: &[arqonbus_protocol::Role]) -> Option<ErrorShape> {
    let Some(required) = min_role(command) else {
        return None;
    };
    let has_role = role.iter().any(|r| *r >= required);
    if has_role {
        None
    } else {
        Some(ErrorShape::new(
            error_codes::AUTHORIZATION_DENIED,
            format!("{command} requires at least the {required:?} role"),
        ))
    }
}

/// Dispatches the fixed command set behind a single authorization gate,
/// mirroring the reference gateway's method-registry shape (§4.7 expansion).
pub struct CommandRegistry {
    handlers: HashMap<&'static str, HandlerFn>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register_defaults();
        registry
    }

    fn register(&mut self, name: &'static str, handler: impl Fn(CommandContext) -> Pin<Box<dyn Future<Output = CommandResult> + Send>> + Send + Sync + 'static) {
        self.handlers.insert(name, Box::new(handler));
    }

    fn register_defaults(&mut self) {
        macro_rules! wire {
            ($name:expr, $handler:path) => {
                self.register($name, |ctx: CommandContext| Box::pin(async move { $handler(&ctx).await }))
            };
        }
        wire!("status", handlers::status);
        wire!("ping", handlers::ping);
        wire!("create_channel", handlers::create_channel);
        wire!("delete_channel", handlers::delete_channel);
        wire!("join_channel", handlers::join_channel);
        wire!("leave_channel", handlers::leave_channel);
        wire!("list_channels", handlers::list_channels);
        wire!("channel_info", handlers::channel_info);
        wire!("history.get", handlers::history_get);
        wire!("history.replay", handlers::history_replay);
        wire!("help", handlers::help);
    }

    /// Dispatch one command, producing a `type=response` envelope addressed
    /// back to the caller with `request_id` equal to the originating
    /// envelope's id (§4.7).
    pub async fn dispatch(&self, ctx: CommandContext) -> Envelope {
        let command = canonical(&ctx.command).to_string();
        let request_id = ctx.request_id.clone();
        let from_client = ctx.client_id().to_string();

        if let Some(err) = authorize(&command, &ctx.principal.roles) {
            warn!(command = %command, client_id = %from_client, "command authorization denied");
            return response_envelope(&request_id, &from_client, "error", serde_json::json!({
                "code": err.code,
                "message": err.message,
            }));
        }

        let Some(handler) = self.handlers.get(command.as_str()) else {
            warn!(command = %command, client_id = %from_client, "unknown command");
            let err = ErrorShape::new(error_codes::COMMAND_NOT_FOUND, format!("unknown command: {command}"));
            return response_envelope(&request_id, &from_client, "error", serde_json::json!({
                "code": err.code,
                "message": err.message,
            }));
        };

        debug!(command = %command, request_id = %request_id, "dispatching command");
        match handler(ctx).await {
            Ok(payload) => response_envelope(&request_id, &from_client, "success", payload),
            Err(err) => {
                warn!(command = %command, request_id = %request_id, code = %err.code, "command error");
                response_envelope(&request_id, &from_client, "error", serde_json::json!({
                    "code": err.code,
                    "message": err.message,
                }))
            },
        }
    }
}

fn response_envelope(request_id: &str, from_client: &str, status: &str, payload: serde_json::Value) -> Envelope {
    Envelope {
        id: format!("{request_id}:response"),
        r#type: EnvelopeType::Response,
        version: PROTOCOL_VERSION.to_string(),
        timestamp: arqonbus_common::time::now_ms(),
        from_client: from_client.to_string(),
        to_client: Some(from_client.to_string()),
        room: None,
        channel: None,
        command: None,
        args: None,
        payload: Some(serde_json::json!({ "status": status, "payload": payload })),
        metadata: None,
        correlation_id: Some(request_id.to_string()),
        tenant_id: None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arqonbus_config::schema::{DuplicateIdentityPolicy, HistoryConfig};
    use arqonbus_history::HistoryStore;
    use arqonbus_protocol::Principal;
    use arqonbus_registry::Registry;
    use arqonbus_rooms::RoomsStore;

    use super::*;

    fn ctx(command: &str, args: serde_json::Value, roles: Vec<Role>) -> CommandContext {
        CommandContext {
            request_id: "req_1".into(),
            command: command.into(),
            args,
            principal: Principal::new("t1", "alice", roles),
            registry: Arc::new(Registry::new(8, DuplicateIdentityPolicy::Supersede)),
            rooms: Arc::new(RoomsStore::new(true, Vec::new())),
            history: Arc::new(HistoryStore::new(&HistoryConfig::default())),
        }
    }

    #[tokio::test]
    async fn ping_succeeds_for_guest() {
        let registry = CommandRegistry::new();
        let response = registry.dispatch(ctx("ping", serde_json::json!({}), vec![Role::Guest])).await;
        assert_eq!(response.r#type, EnvelopeType::Response);
        assert_eq!(response.payload.unwrap()["status"], "success");
    }

    #[tokio::test]
    async fn delete_channel_denies_non_admin() {
        let registry = CommandRegistry::new();
        let response = registry
            .dispatch(ctx(
                "delete_channel",
                serde_json::json!({"room": "ops", "channel": "general"}),
                vec![Role::User],
            ))
            .await;
        assert_eq!(response.payload.unwrap()["status"], "error");
    }

    #[tokio::test]
    async fn join_then_list_channels_round_trips() {
        let registry = CommandRegistry::new();
        let response = registry
            .dispatch(ctx(
                "join_channel",
                serde_json::json!({"room": "ops", "channel": "general"}),
                vec![Role::User],
            ))
            .await;
        assert_eq!(response.payload.unwrap()["status"], "success");

        let response = registry
            .dispatch(ctx("list_channels", serde_json::json!({"room": "ops"}), vec![Role::User]))
            .await;
        let payload = response.payload.unwrap();
        assert_eq!(payload["status"], "success");
        assert_eq!(payload["payload"]["channels"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_command_reports_not_found() {
        let registry = CommandRegistry::new();
        let response = registry.dispatch(ctx("nonexistent", serde_json::json!({}), vec![Role::Admin])).await;
        let payload = response.payload.unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["payload"]["code"], error_codes::COMMAND_NOT_FOUND);
    }

    #[tokio::test]
    async fn alias_resolves_to_canonical_history_get() {
        let registry = CommandRegistry::new();
        let response = registry
            .dispatch(ctx(
                "op.history.get",
                serde_json::json!({"room": "ops", "channel": "general"}),
                vec![Role::User],
            ))
            .await;
        assert_eq!(response.payload.unwrap()["status"], "success");
    }

    #[test]
    fn authorize_allows_any_role_for_ping() {
        assert!(authorize("ping", &[Role::Guest]).is_none());
    }

    #[test]
    fn authorize_denies_guest_for_join() {
        assert!(authorize("join_channel", &[Role::Guest]).is_some());
        assert!(authorize("join_channel", &[Role::User]).is_none());
    }

    #[tokio::test]
    async fn non_admin_history_get_without_room_is_denied() {
        let registry = CommandRegistry::new();
        let response = registry
            .dispatch(ctx("history.get", serde_json::json!({}), vec![Role::User]))
            .await;
        let payload = response.payload.unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["payload"]["code"], error_codes::AUTHORIZATION_DENIED);
    }

    #[tokio::test]
    async fn admin_history_get_without_room_is_global() {
        let registry = CommandRegistry::new();
        let response = registry
            .dispatch(ctx("history.get", serde_json::json!({}), vec![Role::Admin]))
            .await;
        let payload = response.payload.unwrap();
        assert_eq!(payload["status"], "success");
        assert_eq!(payload["payload"]["scope"], "global");
    }
}
